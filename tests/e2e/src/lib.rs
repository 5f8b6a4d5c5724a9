//! Mesh Ledger end-to-end scenarios.
//!
//! Every test starts real nodes on `127.0.0.1` with ephemeral ports and
//! drives them through the public node API. Each file runs on its own:
//!
//! ```bash
//! cargo test -p meshledger-e2e-tests --test basic_mesh -- --nocapture
//! cargo test -p meshledger-e2e-tests --test agreement_round -- --nocapture
//! cargo test -p meshledger-e2e-tests --test block_sync -- --nocapture
//! ```

pub mod helpers;
