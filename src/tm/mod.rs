pub mod fuzzy;
pub mod normalize;
pub mod search;
pub mod store;

pub use fuzzy::token_set_ratio;
pub use normalize::{normalize_source_text, normalized_source_hash};
pub use search::{find_exact, search_fts, search_fuzzy, TmHit, TmHitWithScore};
pub use store::{record_tm_use, upsert_tm_entry, TmEntry, UpsertTmEntry};
