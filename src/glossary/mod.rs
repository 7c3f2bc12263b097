pub mod enforcer;
pub mod matcher;
pub mod store;

pub use enforcer::{enforce_must_use, reinject_term_tokens, EnforcementResult, ExpectedEnforcement};
pub use matcher::{find_must_use_matches, TermMatch};
pub use store::{load_must_use_terms, GlossaryTerm};
