mod scripted;

pub use scripted::{ScriptedChain, BLOCK_TIME_SECS};
