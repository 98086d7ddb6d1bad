//! Default configuration constants for chess-vision.
//!
//! Shared by the configuration types and the components that fall back to
//! them, so the two never drift apart.

/// Default endpoint of the detection service.
pub const ENDPOINT: &str = "ws://localhost:8000/ws";

/// Base reconnect delay in milliseconds.
///
/// The n-th consecutive failure waits `BASE_RECONNECT_DELAY_MS * (n + 1)`.
pub const BASE_RECONNECT_DELAY_MS: u64 = 3000;

/// Upper bound on the reconnect delay in milliseconds.
pub const MAX_RECONNECT_DELAY_MS: u64 = 30000;

/// How long a single connection attempt may take before it counts as failed.
pub const CONNECT_TIMEOUT_MS: u64 = 10000;

/// Frame capture rate.
pub const FRAMES_PER_SECOND: u32 = 30;

/// Settling window for move announcements in milliseconds.
///
/// A diff cycle runs only once no new snapshot has arrived for this long.
pub const DEBOUNCE_MS: u64 = 1000;

/// Speech backend selection that probes for an installed tool.
pub const AUTO_SPEECH_BACKEND: &str = "auto";

/// Spoken when the link to the detection service opens.
pub const CONNECTED_NOTICE: &str = "Connected to chess vision system";

/// Spoken when the link to the detection service drops or fails to open.
pub const DISCONNECTED_NOTICE: &str = "Connection lost. Attempting to reconnect";
