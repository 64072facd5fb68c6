//! Host-resident monitoring daemon: collection loop, CLI/config surface,
//! and the demo plugins shipped with this binary. The engine these wire
//! together (plugin contract, runner, diff engine, remote client, backoff)
//! lives in `hostwarden-core`.

pub mod collection_loop;
pub mod config;
pub mod plugins;
