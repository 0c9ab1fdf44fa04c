//! End-to-end tests for the vision relay. Each test boots the real axum
//! router on an ephemeral port and talks to it over HTTP or WebSocket.
