//! Small integer ids used to cross-reference arena-owned records.
//!
//! Replaces the strong cross-pointers a reflection-based port model would
//! otherwise use: nodes, ports, and edges refer to each other by index,
//! resolved through the owning [`crate::flow::FlowArena`].

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                $name(v as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", stringify!($name), self.0)
            }
        }
    };
}

arena_id!(NodeId);
arena_id!(PortId);
arena_id!(EdgeId);
