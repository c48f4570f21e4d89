use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the expected callback signature: hex-encoded HMAC-SHA256 over
/// `"{gateway_order_id}|{gateway_payment_id}"` keyed by the shared secret.
pub fn sign(gateway_order_id: &str, gateway_payment_id: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies that a payment callback genuinely originated from the gateway.
///
/// The sole gate between "someone claims to have paid" and "stock is
/// committed". A missing order id, payment id, signature, or secret is an
/// immediate rejection, never an "unverified but proceed".
pub fn verify(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    if gateway_order_id.is_empty()
        || gateway_payment_id.is_empty()
        || signature.is_empty()
        || secret.is_empty()
    {
        return false;
    }

    let expected = sign(gateway_order_id, gateway_payment_id, secret);
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
