//! Signed ledger requests
//!
//! A request carries the caller's ed25519 public key (which doubles as its
//! ledger identity), a per-caller nonce and the instruction. The signature
//! covers the borsh encoding of `(nonce, instruction)`.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use solana_program::pubkey::Pubkey;
use staking_program::{Amount, StakingError, StakingInstruction, TokenError};
use thiserror::Error;

/// Token actions a user performs through the same serialized queue
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum TokenInstruction {
    /// Let `spender` pull up to `amount` of the caller's balance
    Approve { spender: Pubkey, amount: Amount },
    /// Send `amount` of the caller's balance to `to`
    Transfer { to: Pubkey, amount: Amount },
}

/// Anything the tick producer can execute
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum LedgerInstruction {
    Staking(StakingInstruction),
    Token(TokenInstruction),
}

/// Request rejected or failed during processing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Caller is not a valid ed25519 public key")]
    InvalidCaller,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Stale nonce {got} (last accepted {last})")]
    StaleNonce { last: u64, got: u64 },

    #[error(transparent)]
    Staking(#[from] StakingError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl RequestError {
    /// Stable numeric code, surfaced by the RPC layer
    pub fn code(&self) -> u32 {
        match self {
            RequestError::InvalidCaller => 200,
            RequestError::InvalidSignature => 201,
            RequestError::StaleNonce { .. } => 202,
            RequestError::Staking(e) => e.code(),
            RequestError::Token(e) => StakingError::Token(e.clone()).code(),
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    pub caller: Pubkey,
    /// Must exceed the caller's last accepted nonce; a fresh caller's last is
    /// 0, so the first usable nonce is 1
    pub nonce: u64,
    pub instruction: LedgerInstruction,
    pub signature: [u8; 64],
}

impl SignedRequest {
    /// Sign `instruction` with `signer`
    pub fn sign(signer: &SigningKey, nonce: u64, instruction: LedgerInstruction) -> Self {
        let message = signing_message(nonce, &instruction);
        let signature = signer.sign(&message).to_bytes();

        Self {
            caller: Pubkey::new_from_array(signer.verifying_key().to_bytes()),
            nonce,
            instruction,
            signature,
        }
    }

    /// Check the signature against the caller key
    pub fn verify(&self) -> Result<(), RequestError> {
        let key = VerifyingKey::from_bytes(&self.caller.to_bytes())
            .map_err(|_| RequestError::InvalidCaller)?;
        let signature = Signature::from_bytes(&self.signature);
        let message = signing_message(self.nonce, &self.instruction);

        key.verify(&message, &signature)
            .map_err(|_| RequestError::InvalidSignature)
    }

    /// Wire encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SignedRequest serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Identity for a signing key
pub fn identity_of(signer: &SigningKey) -> Pubkey {
    Pubkey::new_from_array(signer.verifying_key().to_bytes())
}

/// Borsh encoding of `(nonce, instruction)`
fn signing_message(nonce: u64, instruction: &LedgerInstruction) -> Vec<u8> {
    let mut message = nonce.to_le_bytes().to_vec();
    instruction
        .serialize(&mut message)
        .expect("request message serialization should not fail");
    message
}
