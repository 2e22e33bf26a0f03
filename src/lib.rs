#![warn(missing_docs, missing_debug_implementations)]

//! Check whether a package name is free across the major package registries.
//!
//! One name is sent to PyPI, npm, RubyGems, Maven Central, NuGet, Packagist,
//! Homebrew and the Debian tracker at the same time. Every registry gets
//! exactly one request and exactly one entry in the result, even when its
//! lookup fails: a timeout, a 5xx or an unreadable body is reported as
//! [`Outcome::Failed`](dispatch::Outcome::Failed) for that registry only.
//!
//! # Example
//!
//! ```no_run
//! use name_avail::dispatch::{dispatch, Outcome};
//! use name_avail::probe::Client;
//! use name_avail::registry::{checkers, Registry};
//!
//! let client = Client::new();
//! let results = dispatch("my-cool-package", &checkers(&client));
//! for registry in Registry::ALL {
//!     match results.get(registry.name()) {
//!         Some(Outcome::Available) => println!("{registry}: free"),
//!         Some(Outcome::Taken) => println!("{registry}: taken"),
//!         Some(Outcome::Failed(reason)) => eprintln!("{registry}: {reason}"),
//!         None => unreachable!("every registry reports"),
//!     }
//! }
//! ```

pub mod dispatch;
pub mod probe;
pub mod registry;
