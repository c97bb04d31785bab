pub mod command_task;
pub mod control_tick;
pub mod host_task;
pub mod telemetry_task;
