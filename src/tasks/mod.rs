pub mod control_task;
pub mod radio_task;
