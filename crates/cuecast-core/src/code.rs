//! Room codes.
//!
//! A room code is the short identifier a controller shares out of band so
//! receivers can find its room: six symbols from `A-Z0-9`.

use rand::Rng;
use std::fmt;

/// Number of symbols in a room code.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Symbols a room code is drawn from.
pub const ROOM_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A room identifier.
///
/// Codes issued by the server are always well formed. Codes arriving from
/// clients are wrapped as-is (controller side) or uppercased (receiver side)
/// and simply fail to match when they name no room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCode(String);

impl RoomCode {
    /// Wrap a client-supplied code without touching it.
    #[must_use]
    pub fn verbatim(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Wrap a client-supplied code, uppercased.
    #[must_use]
    pub fn normalized(code: &str) -> Self {
        Self(code.to_uppercase())
    }

    /// Draw a random code.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LENGTH)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Draw random codes until one is not taken.
    ///
    /// Never fails; with 36^6 possible codes a retry is rare, but the
    /// check is never skipped.
    pub fn generate_unused<R, F>(rng: &mut R, is_taken: F) -> Self
    where
        R: Rng + ?Sized,
        F: Fn(&RoomCode) -> bool,
    {
        loop {
            let code = Self::generate(rng);
            if !is_taken(&code) {
                return code;
            }
        }
    }

    /// Whether this code has the shape of a server-issued code.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == ROOM_CODE_LENGTH
            && self.0.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
    }

    /// Get the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}
