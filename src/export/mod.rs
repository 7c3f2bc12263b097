pub mod lp_copy;
pub mod patch;

pub use lp_copy::{run as run_lp_copy_export, LpCopyResult, WorkbookEditor};
pub use patch::{build_patch_table, PatchRow, PatchTable};
