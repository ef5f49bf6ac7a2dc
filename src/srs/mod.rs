pub mod bury;
pub mod card_selector;
pub mod registry;
pub mod sm2;

pub use bury::set_burials;
pub use card_selector::{card_priority, select_next_card};
pub use registry::SchedulerRegistry;
pub use sm2::{schedule_review, Scheduler, Sm2Result, Sm2Scheduler};
