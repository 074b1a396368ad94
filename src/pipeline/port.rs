//! Port descriptors for the node system.
//!
//! Each node declares its ports (inputs/outputs) via static `PortDescriptor`
//! arrays. Slots bind positionally; the names are informative and appear in
//! logs and in node specs.

/// The kind of payload flowing through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// An encoded array.
    Array,
    /// Location of a tabular store.
    Store,
    /// Rendered image bytes.
    Raster,
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static descriptor for a node's port.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub kind: PortKind,
}

impl PortDescriptor {
    pub const fn input(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            kind,
        }
    }

    pub const fn output(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            kind,
        }
    }
}

/// Names of the ports in `ports` facing `direction`, in declaration order.
pub fn port_names(ports: &[PortDescriptor], direction: PortDirection) -> Vec<&'static str> {
    ports
        .iter()
        .filter(|p| p.direction == direction)
        .map(|p| p.name)
        .collect()
}
