//! # paramfw
//!
//! Declarative parameter framework: named criteria, domain/config rule
//! trees, and rule-driven plugin dispatch.
//!
//! ## Module structure (dependency order)
//!
//! ```text
//! system    → public System handle, hooks, plugin registration
//!   ↓
//! engine    → rule matching, amend interpolation, apply, mutation
//!   ↓
//! dump      → human-readable criteria/domain table
//!   ↓
//! sanitizer → name resolution, predicate/kind checks
//!   ↓
//! model     → resolved arena-indexed tree (Criteria, Domain, Rule, ...)
//!   ↓
//! parser    → criteria-file and settings-file grammars
//!   ↓
//! ast       → unresolved syntax tree
//!   ↓
//! lexer     → indentation-aware line/word scanner
//!   ↓
//! error     → PfwError, Result
//! ```

// ============================================================================
// MODULES (dependency order: error → lexer → ast → parser → model →
// sanitizer → engine → dump → system)
// ============================================================================

/// Error type and result alias shared by every module.
pub mod error;

/// Indentation-aware lexical scanner.
pub mod lexer;

/// Unresolved syntax tree produced by the parser.
pub mod ast;

/// Criteria-file and settings-file parsers.
pub mod parser;

/// Resolved, arena-indexed model.
pub mod model;

/// Name resolution and type-checking between the two input files.
pub mod sanitizer;

/// Rule matching, amend interpolation, and the apply/mutation algorithms.
pub mod engine;

/// Human-readable criteria/domain dump table.
pub mod dump;

/// Public `System` handle and host-facing hook types.
pub mod system;

// Re-export the public surface.
pub use error::{PfwError, Result};
pub use model::{CriterionId, CriterionKind, ListenerToken, PluginId};
pub use system::{LoadHook, PluginDef, ReleaseHook, SaveHook, System};
