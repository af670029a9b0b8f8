//! Request-to-response evaluation path.

use std::sync::Arc;

use verdict_core::content::ContentStore;
use verdict_core::context::Context;
use verdict_core::response::Response;
use verdict_core::storage::PolicyStorage;
use verdict_core::wire;

/// Evaluates one marshaled request against a snapshot.
///
/// Codec failures on the request produce an Indeterminate response
/// carrying the error text; a snapshot with no installed policy answers
/// NotApplicable. The response is marshaled into a buffer of
/// `max_response_size` bytes, so oversized obligations degrade through
/// the codec's fixed fallback statuses instead of failing the request.
#[must_use]
pub fn validate(
    storage: &PolicyStorage,
    content: &Arc<ContentStore>,
    request: &[u8],
    max_response_size: usize,
) -> Vec<u8> {
    let attrs = match wire::unmarshal_request(request) {
        Ok(attrs) => attrs,
        Err(err) => {
            return wire::marshal_indeterminate_response(&err.to_string()).unwrap_or_default();
        }
    };

    let ctx = Context::new(attrs.into_iter().map(|a| (a.id, a.value)))
        .with_content(Arc::clone(content));

    let response = match storage.root() {
        Some(root) => root.calculate(&ctx),
        None => Response::not_applicable(),
    };

    marshal(&response, max_response_size)
}

fn marshal(response: &Response, max_response_size: usize) -> Vec<u8> {
    let size = max_response_size.max(wire::MIN_RESPONSE_SIZE);
    let mut buf = vec![0u8; size];

    match wire::marshal_response_to(
        &mut buf,
        response.effect,
        &response.status_text(),
        &response.obligations,
    ) {
        Ok(n) => {
            buf.truncate(n);
            buf
        }
        Err(err) => wire::marshal_indeterminate_response(&err.to_string()).unwrap_or_default(),
    }
}
