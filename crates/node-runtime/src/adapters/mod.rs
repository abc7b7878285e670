//! # Adapters
//!
//! Concrete implementations of the subsystem ports for EVM chains reached
//! over JSON-RPC, plus the bridges that let every subsystem share one
//! transfer state store.
//!
//! | Module | Implements |
//! |--------|------------|
//! | `chain_source` | `ChainDataSource` (bn-01) |
//! | `store_bridges` | `EventSink`, `BondLedger`, `SettlementLedger`, `RelayLedger`, `HealthLedger` |
//! | `chain_reads` | `CreditSource`, `GasOracle`, `ChainStatus`, `NonceChecker` |
//! | `submitter` | `TransactionSubmitter` |
//! | `status` | `/health` and `/metrics` |

pub mod abi;
pub mod chain_reads;
pub mod chain_source;
pub mod lock;
pub mod rpc;
pub mod status;
pub mod store_bridges;
pub mod submitter;

pub use chain_reads::EvmChainReader;
pub use chain_source::EvmChainSource;
pub use lock::{DataDirLock, LockError};
pub use rpc::{JsonRpcClient, RpcError};
pub use status::StatusState;
pub use store_bridges::{CoordinatorView, StoreBridge, TrackerLiquidity, TrackerReleaser};
pub use submitter::SignerSubmitter;
