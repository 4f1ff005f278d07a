//! The version-stamp protocol (spec.md §3, §6, §9).
//!
//! 80-bit form: 8-byte transaction version + 2-byte intra-transaction order.
//! 96-bit form: the same plus an explicit 2-byte user version. An
//! *incomplete* stamp carries a random 10-byte token (identical across every
//! stamp one transaction attempt creates) in place of the transaction
//! version + order; the store substitutes the real bytes atomically at
//! commit time. Hand-built atop `TuplePack`/`TupleUnpack` rather than
//! `foundationdb_tuple::Versionstamp` directly: the 96-bit explicit-user-version
//! form and the `@hex-hex#hex` textual round-trip this crate's callers rely
//! on are a superset of what that type exposes (see DESIGN.md).

use std::fmt;
use std::io::Write;

use rand::RngCore;

use super::{PackError, PackResult, TupleDepth, TuplePack, TupleUnpack, VersionstampOffset};

/// Tuple type-code `foundationdb-tuple` reserves for versionstamps; used
/// only to detect a caller trying to smuggle a raw byte string shaped like
/// one through the generic codec (spec.md §4.1's refusal clause).
const VERSIONSTAMP_TYPE_CODE: u8 = 0x33;

/// All-ones transaction-version placeholder, per spec.md §3: "the
/// transaction-version bytes set to all-ones".
const INCOMPLETE_TX_VERSION: [u8; 8] = [0xff; 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Inner {
	/// `tx_version` is `INCOMPLETE_TX_VERSION`; `order` is the random token
	/// shared by every stamp one transaction attempt produces.
	Incomplete { order_token: [u8; 2] },
	Complete { tx_version: [u8; 8], order: [u8; 2] },
}

/// An 80- or 96-bit version stamp. `user_version` is `None` for the 80-bit
/// form, `Some` for the 96-bit form (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionStamp {
	inner: Inner,
	user_version: Option<u16>,
}

impl VersionStamp {
	/// A fresh incomplete 80-bit stamp, tagged with `order_token` — the
	/// random 10-byte-wide value every stamp from the same transaction
	/// attempt must share (spec.md §9). Use [`VersionStampToken::incomplete`]
	/// to generate that token once per attempt.
	pub fn incomplete(token: VersionStampToken) -> Self {
		VersionStamp {
			inner: Inner::Incomplete {
				order_token: token.0,
			},
			user_version: None,
		}
	}

	/// A fresh incomplete 96-bit stamp with an explicit user version.
	pub fn incomplete_with_user_version(token: VersionStampToken, user_version: u16) -> Self {
		VersionStamp {
			inner: Inner::Incomplete {
				order_token: token.0,
			},
			user_version: Some(user_version),
		}
	}

	/// A resolved 80-bit stamp: `tx_version` is the store's 8-byte
	/// big-endian commit version, `order` the 2-byte intra-transaction order.
	pub fn complete(tx_version: [u8; 8], order: [u8; 2]) -> Self {
		VersionStamp {
			inner: Inner::Complete { tx_version, order },
			user_version: None,
		}
	}

	pub fn complete_with_user_version(tx_version: [u8; 8], order: [u8; 2], user_version: u16) -> Self {
		VersionStamp {
			inner: Inner::Complete { tx_version, order },
			user_version: Some(user_version),
		}
	}

	/// Resolves an incomplete stamp against the 10-byte stamp the store
	/// assigned to the commit (spec.md §3's substitution).
	pub fn resolve(&self, committed: [u8; 10]) -> VersionStamp {
		let mut tx_version = [0u8; 8];
		tx_version.copy_from_slice(&committed[..8]);
		let mut order = [0u8; 2];
		order.copy_from_slice(&committed[8..10]);
		VersionStamp {
			inner: Inner::Complete { tx_version, order },
			user_version: self.user_version,
		}
	}

	pub fn is_complete(&self) -> bool {
		matches!(self.inner, Inner::Complete { .. })
	}

	pub fn user_version(&self) -> Option<u16> {
		self.user_version
	}

	/// The 8-byte transaction version, or `None` for an incomplete stamp.
	pub fn transaction_version(&self) -> Option<[u8; 8]> {
		match self.inner {
			Inner::Complete { tx_version, .. } => Some(tx_version),
			Inner::Incomplete { .. } => None,
		}
	}

	/// The 10-byte wire form: `[tx_version(8) | order(2)]`, or the
	/// placeholder `[0xff * 8 | random_token(2)]` if incomplete.
	pub fn ten_bytes(&self) -> [u8; 10] {
		let mut out = [0u8; 10];
		match self.inner {
			Inner::Complete { tx_version, order } => {
				out[..8].copy_from_slice(&tx_version);
				out[8..].copy_from_slice(&order);
			}
			Inner::Incomplete { order_token } => {
				out[..8].copy_from_slice(&INCOMPLETE_TX_VERSION);
				out[8..].copy_from_slice(&order_token);
			}
		}
		out
	}

	/// The full 10- or 12-byte wire form, per spec.md §6.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = self.ten_bytes().to_vec();
		if let Some(user_version) = self.user_version {
			out.extend_from_slice(&user_version.to_be_bytes());
		}
		out
	}

	/// Parses the wire form produced by [`Self::to_bytes`].
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, VersionStampParseError> {
		if bytes.len() != 10 && bytes.len() != 12 {
			return Err(VersionStampParseError::WrongLength(bytes.len()));
		}
		let mut tx_version = [0u8; 8];
		tx_version.copy_from_slice(&bytes[..8]);
		let mut order = [0u8; 2];
		order.copy_from_slice(&bytes[8..10]);
		let user_version = if bytes.len() == 12 {
			Some(u16::from_be_bytes([bytes[10], bytes[11]]))
		} else {
			None
		};
		let inner = if tx_version == INCOMPLETE_TX_VERSION {
			Inner::Incomplete { order_token: order }
		} else {
			Inner::Complete { tx_version, order }
		};
		Ok(VersionStamp { inner, user_version })
	}

	/// Textual form: `@<hex-tx>-<hex-order>[#<hex-user>]`, `@?...` if
	/// incomplete (spec.md §6). Round-trips through [`Self::parse`].
	pub fn to_text(&self) -> String {
		let (tx_hex, complete) = match self.inner {
			Inner::Complete { tx_version, .. } => (hex::encode(tx_version), true),
			Inner::Incomplete { .. } => (hex::encode(INCOMPLETE_TX_VERSION), false),
		};
		let order_hex = match self.inner {
			Inner::Complete { order, .. } => hex::encode(order),
			Inner::Incomplete { order_token } => hex::encode(order_token),
		};
		let marker = if complete { "@" } else { "@?" };
		match self.user_version {
			Some(uv) => format!("{marker}{tx_hex}-{order_hex}#{:04x}", uv),
			None => format!("{marker}{tx_hex}-{order_hex}"),
		}
	}

	/// Parses the textual form produced by [`Self::to_text`].
	pub fn parse(text: &str) -> Result<Self, VersionStampParseError> {
		let (incomplete, rest) = if let Some(rest) = text.strip_prefix("@?") {
			(true, rest)
		} else if let Some(rest) = text.strip_prefix('@') {
			(false, rest)
		} else {
			return Err(VersionStampParseError::MissingMarker);
		};

		let (head, user_version) = match rest.split_once('#') {
			Some((head, uv)) => {
				let uv = u16::from_str_radix(uv, 16)
					.map_err(|_| VersionStampParseError::BadHex(uv.to_string()))?;
				(head, Some(uv))
			}
			None => (rest, None),
		};

		let (tx_hex, order_hex) = head
			.split_once('-')
			.ok_or_else(|| VersionStampParseError::MissingSeparator(head.to_string()))?;

		let tx_bytes =
			hex::decode(tx_hex).map_err(|_| VersionStampParseError::BadHex(tx_hex.to_string()))?;
		let order_bytes =
			hex::decode(order_hex).map_err(|_| VersionStampParseError::BadHex(order_hex.to_string()))?;
		if tx_bytes.len() != 8 || order_bytes.len() != 2 {
			return Err(VersionStampParseError::WrongLength(tx_bytes.len() + order_bytes.len()));
		}
		let mut order = [0u8; 2];
		order.copy_from_slice(&order_bytes);

		let inner = if incomplete {
			Inner::Incomplete { order_token: order }
		} else {
			let mut tx_version = [0u8; 8];
			tx_version.copy_from_slice(&tx_bytes);
			Inner::Complete { tx_version, order }
		};
		Ok(VersionStamp { inner, user_version })
	}
}

impl fmt::Display for VersionStamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_text())
	}
}

/// Stamps compare by transaction version, then order, then user version
/// (spec.md §3). Incomplete stamps (all-ones tx version) sort after every
/// complete one, consistent with their placeholder bytes.
impl PartialOrd for VersionStamp {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for VersionStamp {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.ten_bytes()
			.cmp(&other.ten_bytes())
			.then(self.user_version.cmp(&other.user_version))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionStampParseError {
	#[error("version stamp text is missing its '@' marker")]
	MissingMarker,
	#[error("version stamp text `{0}` is missing its '-' separator")]
	MissingSeparator(String),
	#[error("invalid hex in version stamp text: `{0}`")]
	BadHex(String),
	#[error("version stamp has the wrong byte length: {0}")]
	WrongLength(usize),
}

/// The random 10-byte token shared by every incomplete stamp one
/// transaction attempt produces (spec.md §9: regenerated on `reset()`,
/// identical across all stamps from one attempt so the store can substitute
/// them atomically). Only the trailing 2 bytes are surfaced here — the
/// leading 8 are always the reserved all-ones placeholder — but the type is
/// named for the full 10-byte protocol it stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionStampToken([u8; 2]);

impl VersionStampToken {
	pub fn generate() -> Self {
		let mut bytes = [0u8; 2];
		rand::thread_rng().fill_bytes(&mut bytes);
		VersionStampToken(bytes)
	}
}

impl TuplePack for VersionStamp {
	fn pack<W: Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> std::io::Result<VersionstampOffset> {
		let _ = tuple_depth;
		w.write_all(&[VERSIONSTAMP_TYPE_CODE])?;
		match self.inner {
			Inner::Complete { tx_version, order } => {
				w.write_all(&tx_version)?;
				w.write_all(&order)?;
				Ok(VersionstampOffset::None { size: 11 })
			}
			Inner::Incomplete { order_token } => {
				// Offset is measured from the start of the *caller's* buffer,
				// which TuplePack implementations generally don't see; callers
				// needing the absolute offset use `pack_with_versionstamp`
				// (spec.md §4.1), which re-derives it against its own `Vec`.
				w.write_all(&INCOMPLETE_TX_VERSION)?;
				w.write_all(&order_token)?;
				Ok(VersionstampOffset::Some { offset: 1 })
			}
		}
	}
}

impl<'de> TupleUnpack<'de> for VersionStamp {
	fn unpack(input: &'de [u8], _tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
		let Some((&code, rest)) = input.split_first() else {
			return Err(PackError::Message("empty input for version stamp".to_string()));
		};
		if code != VERSIONSTAMP_TYPE_CODE {
			return Err(PackError::Message(format!(
				"expected version stamp type code 0x{:02x}, got 0x{:02x}",
				VERSIONSTAMP_TYPE_CODE, code
			)));
		}
		if rest.len() < 10 {
			return Err(PackError::Message("truncated version stamp".to_string()));
		}
		let (stamp_bytes, rest) = rest.split_at(10);
		let stamp =
			VersionStamp::from_bytes(stamp_bytes).map_err(|e| PackError::Message(e.to_string()))?;
		Ok((rest, stamp))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn text_round_trips_complete_with_and_without_user_version() {
		let v = VersionStamp::complete([1, 2, 3, 4, 5, 6, 7, 8], [0, 1]);
		assert_eq!(VersionStamp::parse(&v.to_text()).unwrap(), v);

		let v2 = VersionStamp::complete_with_user_version([1, 2, 3, 4, 5, 6, 7, 8], [0, 1], 42);
		assert_eq!(VersionStamp::parse(&v2.to_text()).unwrap(), v2);
	}

	#[test]
	fn text_round_trips_incomplete() {
		let token = VersionStampToken::generate();
		let v = VersionStamp::incomplete(token);
		let text = v.to_text();
		assert!(text.starts_with("@?"));
		assert_eq!(VersionStamp::parse(&text).unwrap(), v);
	}

	#[test]
	fn two_stamps_from_same_token_share_ten_byte_prefix() {
		let token = VersionStampToken::generate();
		let a = VersionStamp::incomplete(token);
		let b = VersionStamp::incomplete_with_user_version(token, 7);
		assert_eq!(a.ten_bytes(), b.ten_bytes());
	}

	#[test]
	fn ordering_is_by_tx_version_then_order_then_user_version() {
		let a = VersionStamp::complete([0; 8], [0, 0]);
		let b = VersionStamp::complete([0; 8], [0, 1]);
		let c = VersionStamp::complete([1; 8], [0, 0]);
		assert!(a < b);
		assert!(b < c);
	}

	#[test]
	fn resolve_substitutes_incomplete_prefix() {
		let token = VersionStampToken::generate();
		let incomplete = VersionStamp::incomplete(token);
		let resolved = incomplete.resolve([9; 10]);
		assert!(resolved.is_complete());
		assert_eq!(resolved.transaction_version().unwrap(), [9u8; 8]);
	}
}
