//! Response (de)serialization with bounded-buffer fallbacks.

use crate::attr::AttributeAssignment;
use crate::response::Effect;

use super::error::WireError;
use super::request::{
    assignment_size, check_version, get_assignments, get_u16, put_assignments, put_u16,
    put_version, MAX_STRING_LEN,
};

const STATUS_TOO_LONG: &str = "status too long";
const OBLIGATIONS_TOO_LONG: &str = "obligations too long";

/// Fixed response header: version, effect, status length, count.
const RESPONSE_HEADER_SIZE: usize = 2 + 1 + 2 + 2;

/// Smallest buffer that can always carry a fallback response.
pub const MIN_RESPONSE_SIZE: usize = RESPONSE_HEADER_SIZE + OBLIGATIONS_TOO_LONG.len();

/// Decoded decision response.
#[derive(Debug, Clone)]
pub struct Decision {
    /// The decision effect.
    pub effect: Effect,
    /// Rendered status chain, when the server reported one.
    pub status: Option<String>,
    /// Obligation assignments in server order.
    pub obligations: Vec<AttributeAssignment>,
}

impl Decision {
    /// Looks up an obligation value by attribute id.
    #[must_use]
    pub fn obligation(&self, id: &str) -> Option<&AttributeAssignment> {
        self.obligations.iter().find(|a| a.id == id)
    }

    /// Whether the decision permits the request.
    #[must_use]
    pub fn is_permit(&self) -> bool {
        self.effect == Effect::Permit
    }
}

fn put_effect(b: &mut [u8], effect: Effect) -> Result<usize, WireError> {
    if b.is_empty() {
        return Err(WireError::BufferOverflow);
    }
    b[0] = effect.wire_byte();
    Ok(1)
}

fn put_status(b: &mut [u8], status: &str) -> Result<usize, WireError> {
    if status.len() > MAX_STRING_LEN {
        return Err(WireError::TooLongStringValue { len: status.len() });
    }

    let n = status.len() + 2;
    if b.len() < n {
        return Err(WireError::BufferOverflow);
    }

    #[allow(clippy::cast_possible_truncation)] // checked against MAX_STRING_LEN
    let len = status.len() as u16;
    b[..2].copy_from_slice(&len.to_le_bytes());
    b[2..n].copy_from_slice(status.as_bytes());
    Ok(n)
}

fn put_fallback(b: &mut [u8], effect: Effect, status: &str) -> Result<usize, WireError> {
    let mut off = put_version(b)?;
    off += put_effect(&mut b[off..], effect)?;
    off += put_status(&mut b[off..], status)?;
    off += put_u16(&mut b[off..], 0)?;
    Ok(off)
}

/// Size of the marshaled response for the given parts.
///
/// # Errors
///
/// Propagates attribute limit errors for oversized obligations.
pub fn response_size(status: &str, obligations: &[AttributeAssignment]) -> Result<usize, WireError> {
    let mut size = RESPONSE_HEADER_SIZE + status.len();
    for a in obligations {
        size += assignment_size(a)?;
    }
    Ok(size)
}

/// Marshals a response into the caller's buffer, returning bytes written.
///
/// When the obligations do not fit, the response degrades to the effect
/// with an "obligations too long" status; when the status itself cannot
/// be written, it degrades to the fixed "status too long" sentinel. The
/// buffer must be at least [`MIN_RESPONSE_SIZE`] bytes for the fallbacks
/// to be guaranteed.
///
/// # Errors
///
/// Returns [`WireError::BufferOverflow`] when even a fallback response
/// does not fit.
pub fn marshal_response_to(
    b: &mut [u8],
    effect: Effect,
    status: &str,
    obligations: &[AttributeAssignment],
) -> Result<usize, WireError> {
    let mut off = put_version(b)?;
    off += put_effect(&mut b[off..], effect)?;

    match put_status(&mut b[off..], status) {
        Ok(n) => off += n,
        Err(_) => return put_fallback(b, effect, STATUS_TOO_LONG),
    }

    match put_assignments(&mut b[off..], obligations) {
        Ok(n) => Ok(off + n),
        Err(WireError::BufferOverflow) => put_fallback(b, effect, OBLIGATIONS_TOO_LONG),
        Err(err) => Err(err),
    }
}

/// Marshals a response into a freshly sized buffer.
///
/// # Errors
///
/// Propagates attribute limit errors; allocation is sized exactly, so
/// the buffer fallbacks never fire here unless the status itself exceeds
/// the wire limit.
pub fn marshal_response(
    effect: Effect,
    status: &str,
    obligations: &[AttributeAssignment],
) -> Result<Vec<u8>, WireError> {
    let size = response_size(status, obligations)?.max(MIN_RESPONSE_SIZE);
    let mut b = vec![0u8; size];
    let n = marshal_response_to(&mut b, effect, status, obligations)?;
    b.truncate(n);
    Ok(b)
}

/// Marshals a server-side failure as an Indeterminate response with no
/// obligations.
///
/// # Errors
///
/// Propagates [`marshal_response`] failures.
pub fn marshal_indeterminate_response(status: &str) -> Result<Vec<u8>, WireError> {
    marshal_response(Effect::Indeterminate, status, &[])
}

/// Parses a response.
///
/// # Errors
///
/// Returns [`WireError::RequestVersionMismatch`] for foreign versions,
/// [`WireError::InvalidEffect`] for unknown effect bytes and the value
/// errors of the attribute table for malformed obligations.
pub fn unmarshal_response(b: &[u8]) -> Result<Decision, WireError> {
    let mut off = check_version(b)?;

    if b.len() <= off {
        return Err(WireError::BufferUnderflow);
    }
    let effect_byte = b[off];
    let effect =
        Effect::from_wire_byte(effect_byte).ok_or(WireError::InvalidEffect { effect: effect_byte })?;
    off += 1;

    let (status_len, n) = get_u16(&b[off..])?;
    off += n;
    let status_end = off + status_len as usize;
    if b.len() < status_end {
        return Err(WireError::BufferUnderflow);
    }
    let status = std::str::from_utf8(&b[off..status_end])
        .map_err(|_| WireError::InvalidStringEncoding)?;
    let status = if status.is_empty() {
        None
    } else {
        Some(status.to_string())
    };
    off = status_end;

    let (obligations, _) = get_assignments(&b[off..])?;

    Ok(Decision {
        effect,
        status,
        obligations,
    })
}
