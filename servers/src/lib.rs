// Serving layer of the vision relay: configuration, logging, the HTTP and
// WebSocket surface, keep-alive monitor and archive storage. The pipeline
// core lives in `vision_common`.

pub mod vision_logic;
