pub mod sysinfo_table;

pub use sysinfo_table::SysinfoTable;
