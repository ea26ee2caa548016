//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter  | Implements                             | Connects to          |
//! |----------|----------------------------------------|----------------------|
//! | `sim`    | KeyboardPort, EepromPort, MemoryPort   | host memory          |
//! | `time`   | Clock                                  | `std::time::Instant` |
//! | `stdout` | Transport                              | hex lines on stdout  |

pub mod sim;
pub mod stdout;
pub mod time;
