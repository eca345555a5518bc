use facet::Facet;

/// Index of a collector, as assigned by the client. Collector `0` is the
/// synthetic root ("Frame") every other collector hangs under.
pub type CollectorIndex = i32;

/// Index of a client thread, as assigned by the client.
pub type ThreadIndex = i32;

/// Number of a frame within one thread's stream.
pub type FrameNumber = i32;

pub const ROOT_COLLECTOR: CollectorIndex = 0;

/// Definition of one collector.
///
/// `level_units`, `suggested_scale` and `sort` are display hints; the
/// server stores and returns them without interpreting them.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct CollectorDef {
    pub index: CollectorIndex,
    pub name: String,
    pub parent_index: CollectorIndex,
    pub level_units: String,
    pub suggested_scale: f64,
    pub sort: i32,
}

impl CollectorDef {
    pub fn new(index: CollectorIndex, name: impl Into<String>, parent_index: CollectorIndex) -> Self {
        Self {
            index,
            name: name.into(),
            parent_index,
            level_units: String::new(),
            suggested_scale: 0.0,
            sort: -1,
        }
    }

    /// Stand-in returned for any collector the client never defined.
    pub fn unknown() -> Self {
        Self::new(-1, "Unknown", ROOT_COLLECTOR)
    }

    pub fn is_unknown(&self) -> bool {
        self.index < 0
    }

    pub fn is_root(&self) -> bool {
        self.index == ROOT_COLLECTOR
    }
}
