// Component A: acquisition side of the pipeline
// Capture thread → Frame Channel → Perception thread → Result Channel.
// Both channels are bounded and drop the newest item when full, so a slow stage
// never stalls a fast one and latency stays bounded.

pub mod shutdown;
pub mod channel;
pub mod capture;
pub mod perception;

// Perceivers used by the binary when no vision stack is attached
pub mod replay;
pub mod scenario;
