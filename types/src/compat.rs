#![cfg(test)]
use crate::execution::{Event, Instruction, Key, Transaction};
use crate::game::{GameError, GameMeta};
use commonware_codec::{DecodeExt, Encode};
use commonware_cryptography::{ed25519::PrivateKey, Signer};

#[test]
fn instruction_encoding_is_stable() {
    assert_eq!(Instruction::StartGame.encode().as_ref(), &[0u8]);
    assert_eq!(
        Instruction::PlayRound { index: 2 }.encode().as_ref(),
        &[1u8, 2]
    );
}

#[test]
fn game_error_encoding_is_stable() {
    assert_eq!(GameError::SessionNotStarted.encode().as_ref(), &[0u8]);
    assert_eq!(GameError::InvalidRound(7).encode().as_ref(), &[1u8, 7]);
    assert_eq!(GameError::RoundAlreadyPlayed(1).encode().as_ref(), &[2u8, 1]);
    assert_eq!(GameError::GameCompleted.encode().as_ref(), &[3u8]);
}

#[test]
fn meta_encoding_is_stable() {
    let meta = GameMeta {
        rounds_played: 2,
        used_cards: [true, false, true],
        initialized: true,
    };
    assert_eq!(meta.encode().as_ref(), &[2u8, 1, 0, 1, 1]);
}

#[test]
fn transaction_signature_covers_instruction() {
    let private = PrivateKey::from_seed(1);
    let tx = Transaction::sign(&private, 0, Instruction::PlayRound { index: 1 });
    assert!(tx.verify());

    let decoded = Transaction::decode(tx.encode().as_ref()).unwrap();
    assert_eq!(decoded, tx);

    let mut forged = tx.clone();
    forged.instruction = Instruction::PlayRound { index: 2 };
    assert!(!forged.verify());

    let mut replayed = tx;
    replayed.nonce = 1;
    assert!(!replayed.verify());
}

#[test]
fn key_tags_are_distinct() {
    let public = PrivateKey::from_seed(3).public_key();
    let account = Key::Account(public.clone()).encode();
    let session = Key::Session(public.clone()).encode();
    assert_eq!(account[0], 0);
    assert_eq!(session[0], 1);
    assert_ne!(account, session);

    let event = Event::RoundPlayed {
        owner: public,
        index: 1,
        rounds_played: 2,
    };
    assert_eq!(Event::decode(event.encode().as_ref()).unwrap(), event);
}

mod fuzz {
    use crate::game::PlayerSession;
    use commonware_codec::{DecodeExt, FixedSize};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decoded_sessions_hold_invariants(
            bytes in proptest::collection::vec(any::<u8>(), PlayerSession::SIZE)
        ) {
            if let Ok(session) = PlayerSession::decode(bytes.as_ref()) {
                prop_assert!(session.validate_invariants().is_ok());
                prop_assert!(session.rounds_played as usize <= crate::ROUND_COUNT);
            }
        }

        #[test]
        fn short_session_bytes_are_rejected(
            bytes in proptest::collection::vec(any::<u8>(), 0..PlayerSession::SIZE)
        ) {
            prop_assert!(PlayerSession::decode(bytes.as_ref()).is_err());
        }
    }
}
