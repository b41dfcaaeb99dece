//! Abstract Heap Location
//!
//! Represents creation sites in the program.
//! Each `new T()`, tracked factory result, out-argument instance and tuple maps
//! to one location per (creation operation, call context).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::flow_graph::domain::{OperationRef, TypeName};
use crate::features::interprocedural::CallContext;

/// Unique identifier for abstract locations
pub type LocationId = u32;

/// Reserved id of the shared null location
pub const NULL_LOCATION: LocationId = 0;

/// Reserved id of the shared unknown location
pub const UNKNOWN_LOCATION: LocationId = u32::MAX;

/// How the location was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    Null,
    Unknown,
    /// `new T(...)`
    Allocation,
    /// Call result matched by a "returns new instance" ownership rule
    FactoryResult,
    /// Instance handed back through an out-argument
    OutArgument { index: usize },
    /// Tuple with one heap slot per element
    Tuple,
}

/// Abstract representation of a creation site
///
/// Created when first observed, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractLocation {
    /// Unique numeric ID for efficient set operations
    pub id: LocationId,

    pub kind: LocationKind,

    /// Creation operation (None for the reserved locations)
    pub site: Option<OperationRef>,

    /// Call chain under which the creation was observed
    pub context: CallContext,

    /// Type information (if available)
    pub type_info: Option<TypeName>,

    /// Instances must be released
    pub is_disposable: bool,

    /// Wrapper type that takes ownership of its constructor arguments
    pub takes_ownership: bool,

    /// Operation of the analyzed procedure at the top of the creation call stack
    pub report_site: Option<OperationRef>,

    /// Report site lies inside a loop of the analyzed procedure
    pub in_loop: bool,
}

impl AbstractLocation {
    /// Create a special "null" location
    #[inline]
    pub fn null() -> Self {
        Self::reserved(NULL_LOCATION, LocationKind::Null)
    }

    /// Create a special "unknown" location (conservative)
    #[inline]
    pub fn unknown() -> Self {
        Self::reserved(UNKNOWN_LOCATION, LocationKind::Unknown)
    }

    fn reserved(id: LocationId, kind: LocationKind) -> Self {
        Self {
            id,
            kind,
            site: None,
            context: CallContext::root(),
            type_info: None,
            is_disposable: false,
            takes_ownership: false,
            report_site: None,
            in_loop: false,
        }
    }

    /// Check if this is the null location
    #[inline]
    pub fn is_null(&self) -> bool {
        self.id == NULL_LOCATION
    }

    /// Check if this is the unknown location
    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_LOCATION
    }

    /// Created below the given call depth (inside a callee being re-analyzed)
    #[inline]
    pub fn is_deeper_than(&self, depth: usize) -> bool {
        self.context.depth > depth
    }
}

impl fmt::Display for AbstractLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.site) {
            (LocationKind::Null, _) => write!(f, "null"),
            (LocationKind::Unknown, _) => write!(f, "unknown"),
            (_, Some(site)) => {
                write!(f, "alloc:{}:{}", site.procedure.0, site.operation)?;
                if let Some(ref ty) = self.type_info {
                    write!(f, ":{}", ty)?;
                }
                if self.context.depth > 0 {
                    write!(f, "@{}", self.context.depth)?;
                }
                Ok(())
            }
            (_, None) => write!(f, "loc{}", self.id),
        }
    }
}

/// Everything the factory needs to create a location on first observation
#[derive(Debug, Clone)]
pub struct LocationRequest {
    pub site: OperationRef,
    /// Distinguishes several locations of one operation (out-arguments)
    pub slot: u32,
    pub context: CallContext,
    pub kind: LocationKind,
    pub type_info: Option<TypeName>,
    pub is_disposable: bool,
    pub takes_ownership: bool,
    pub report_site: Option<OperationRef>,
    pub in_loop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SiteKey {
    site: OperationRef,
    slot: u32,
    context: CallContext,
}

/// Factory for abstract locations with stable IDs
///
/// The same (operation, slot, context) always yields the same id within one
/// analysis session; ids are assigned in first-observation order.
#[derive(Debug)]
pub struct LocationFactory {
    locations: Vec<AbstractLocation>,
    by_site: FxHashMap<SiteKey, LocationId>,
    unknown: AbstractLocation,
}

impl Default for LocationFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationFactory {
    pub fn new() -> Self {
        Self {
            locations: vec![AbstractLocation::null()], // 0 is reserved for null
            by_site: FxHashMap::default(),
            unknown: AbstractLocation::unknown(),
        }
    }

    /// Location for a creation site, created on first request
    pub fn location_for(&mut self, request: LocationRequest) -> LocationId {
        let key = SiteKey {
            site: request.site,
            slot: request.slot,
            context: request.context.clone(),
        };
        if let Some(id) = self.by_site.get(&key) {
            return *id;
        }

        let id = self.locations.len() as LocationId;
        self.locations.push(AbstractLocation {
            id,
            kind: request.kind,
            site: Some(request.site),
            context: request.context,
            type_info: request.type_info,
            is_disposable: request.is_disposable,
            takes_ownership: request.takes_ownership,
            report_site: request.report_site,
            in_loop: request.in_loop,
        });
        self.by_site.insert(key, id);
        id
    }

    #[inline]
    pub fn get(&self, id: LocationId) -> Option<&AbstractLocation> {
        if id == UNKNOWN_LOCATION {
            Some(&self.unknown)
        } else {
            self.locations.get(id as usize)
        }
    }

    pub fn is_disposable(&self, id: LocationId) -> bool {
        self.get(id).map(|l| l.is_disposable).unwrap_or(false)
    }

    /// Current count of created locations (reserved ones excluded)
    #[inline]
    pub fn count(&self) -> u32 {
        self.locations.len() as u32 - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbstractLocation> {
        self.locations.iter().skip(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::domain::ProcedureId;

    fn request(op: u32, context: CallContext) -> LocationRequest {
        LocationRequest {
            site: OperationRef::new(ProcedureId(0), op),
            slot: 0,
            context,
            kind: LocationKind::Allocation,
            type_info: Some(TypeName::new("Acme.Stream")),
            is_disposable: true,
            takes_ownership: false,
            report_site: Some(OperationRef::new(ProcedureId(0), op)),
            in_loop: false,
        }
    }

    #[test]
    fn test_special_locations() {
        let factory = LocationFactory::new();
        assert!(factory.get(NULL_LOCATION).unwrap().is_null());
        assert!(factory.get(UNKNOWN_LOCATION).unwrap().is_unknown());
        assert_eq!(factory.count(), 0);
    }

    #[test]
    fn test_same_site_same_id() {
        let mut factory = LocationFactory::new();
        let a = factory.location_for(request(3, CallContext::root()));
        let b = factory.location_for(request(3, CallContext::root()));
        let c = factory.location_for(request(4, CallContext::root()));

        assert_eq!(a, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(factory.count(), 2);
    }

    #[test]
    fn test_context_distinguishes_locations() {
        let mut factory = LocationFactory::new();
        let site = OperationRef::new(ProcedureId(0), 9);
        let a = factory.location_for(request(3, CallContext::root()));
        let b = factory.location_for(request(3, CallContext::root().with_call(site, ProcedureId(1))));

        assert_ne!(a, b);
        assert!(factory.get(b).unwrap().is_deeper_than(0));
        assert_eq!(factory.get(a).unwrap().to_string(), "alloc:0:3:Acme.Stream");
    }
}
