use tokio_util::sync::CancellationToken;

use crate::render::Checkpoint;

/// The shared cancellation signal as seen by one unit.
///
/// Disarmed signals (the run was started without `--interrupt`) never report
/// cancellation, even when the underlying token has been cancelled.
#[derive(Clone)]
pub struct CancelSignal {
    token: CancellationToken,
    armed: bool,
}

impl CancelSignal {
    pub fn new(token: CancellationToken, armed: bool) -> Self {
        Self { token, armed }
    }
}

impl Checkpoint for CancelSignal {
    fn should_cancel(&self) -> bool {
        self.armed && self.token.is_cancelled()
    }
}
