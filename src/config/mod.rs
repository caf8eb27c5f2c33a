pub mod pid;

pub use pid::{DtermFilterType, FilterConfig, LevelConfig, Pid, PidProfile};
