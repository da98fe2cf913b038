//! Encrypted wars execution layer.
//!
//! This crate contains the round engine, the read projection over the session repository and the
//! staged transaction [`Layer`] used by the simulator.
//!
//! ## Confidentiality requirements
//! - The engine never computes, compares or stores a cleartext card or score. All arithmetic goes
//!   through the injected [`Backend`].
//! - Only the decryption oracle holds a [`Decrypter`]; nothing in the engine path takes one.
//!
//! ## Atomicity
//! Every instruction is staged in the layer's pending overlay and written to the session only
//! once it has fully succeeded. Callers apply [`Layer::commit`] to the repository after
//! [`Layer::execute`] returns `Ok`; on `Err` the layer is dropped and nothing is written.
//!
//! ## Minimal execution pipeline (example)
//! ```rust,ignore
//! use encwars_execution::{fhe::Simulated, Layer, Memory, State};
//! use encwars_types::{execution::{Instruction, Transaction}, ledger_address};
//!
//! # async fn example(signer: commonware_cryptography::ed25519::PrivateKey) -> anyhow::Result<()> {
//! let mut state = Memory::default();
//! let backend = Simulated::new(0);
//! let mut layer = Layer::new(&state, &backend, ledger_address(b"local"));
//! let receipts = layer
//!     .execute(vec![Transaction::sign(&signer, 0, Instruction::StartGame)])
//!     .await?;
//! let changes = layer.commit();
//! state.apply(changes).await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod fhe;
pub mod projection;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

mod layer;

mod state;

pub use engine::{check_play, play_round, start_game, ExecutionError};
pub use fhe::{Backend, Decrypter, Simulated};
pub use layer::{Layer, Receipt};
pub use state::{load_session, nonce, Memory, PrepareError, State, Status};
