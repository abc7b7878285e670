//! # Integration Flows
//!
//! Each flow runs real subsystems against one shared transfer state store.
//!
//! | Flow | Path |
//! |------|------|
//! | `bonding` | store → bonding engine → submitter → store |
//! | `settlement` | store → settlement coordinator → liquidity release |
//! | `relay` | store → attestation relay → submitter → store |
//! | `watcher` | scripted chain → watcher → store → bonding engine |
//! | `runtime` | container assembly, task start and shutdown |

pub mod bonding;
pub mod relay;
pub mod runtime;
pub mod settlement;
pub mod watcher;
