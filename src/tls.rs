//! Process-wide TLS verification policy.
//!
//! Certificate verification is a property of the shared HTTP client, so the
//! only global state left is the operator notice for disabled verification.
//! It is emitted at most once per process, on the first call to
//! [`init_tls_policy`] with `verify == false`, and never from the fetch path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INSECURE_NOTICE: Once = Once::new();
static INSECURE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Records the TLS policy for this process.
///
/// Call during startup, before any client is built. Repeated calls are cheap
/// and do not repeat the warning.
pub fn init_tls_policy(verify: bool) {
    if verify {
        return;
    }

    INSECURE_NOTICE.call_once(|| {
        INSECURE_ACTIVE.store(true, Ordering::Release);
        tracing::warn!(
            "TLS certificate verification is disabled; feeds with invalid or self-signed certificates will be accepted"
        );
    });
}

/// Whether an insecure policy has been announced in this process.
pub fn insecure_tls_active() -> bool {
    INSECURE_ACTIVE.load(Ordering::Acquire)
}
