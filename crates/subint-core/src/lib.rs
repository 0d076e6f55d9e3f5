//! # subint-core
//!
//! Integer sub-type resolution for statement-form bytecode method bodies.
//!
//! The verifier folds `boolean`, `byte`, `short`, `char` and `int` into one
//! integer category. This crate recovers the precise type of every
//! integer-family local from how the body uses it, and writes the types back
//! only when the whole body types consistently.
//!
//! ## Modules
//!
//! - **[`ir`]** - Method bodies, statements and declared types
//! - **[`typing`]** - Lattice, constraint graph and the two-phase resolver
//! - **[`config`]** - Resolver configuration
//! - **[`error`]** - Malformed, retryable and fatal failures
//!
//! ## Quick Start
//!
//! ```rust
//! use subint_core::ir::{CmpOp, MethodBody, Stmt, Type};
//! use subint_core::typing::TypeNode;
//!
//! let mut body = MethodBody::new("isReady", Type::Void);
//! let flag = body.add_local("flag", Type::Int);
//! body.push(Stmt::assign(flag, 1));
//! body.push(Stmt::compare(CmpOp::Ne, flag, 0));
//!
//! let resolution = subint_core::resolve(&mut body).unwrap();
//! assert_eq!(resolution.type_of(flag), Some(TypeNode::Boolean));
//! assert_eq!(body.local_type(flag), Some(&Type::Boolean));
//! ```

pub mod config;
pub mod error;
pub mod ir;
pub mod typing;

pub use config::{ConfigError, ResolverConfig};
pub use error::{FatalTypeError, MalformedStatement, ResolveError, RetryableInferenceFailure};
pub use typing::{resolve, IntegerTypeResolver, Phase, Resolution, ResolverState, TypeNode};
