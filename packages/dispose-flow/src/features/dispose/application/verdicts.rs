//! Verdict collection
//!
//! Turns the stable exit states and lost-reference events of the analyzed
//! procedure into verdicts:
//! 1. Candidates: disposable locations still open at the normal exit, at the
//!    unhandled-exception exit or at a lost-reference point
//! 2. Mode filter (exception paths, maybe-disposed)
//! 3. Loop coalescing: a loop-carried location sharing a holder with a
//!    pre-loop location is folded into the pre-loop verdict, which keeps the
//!    stronger path kind
//! 4. Strongest severity per location, one verdict per reporting site

use std::collections::BTreeMap;

use super::transfer::LostReference;
use crate::config::DisposeAnalysisKind;
use crate::features::dispose::domain::{
    AnalysisState, Classification, DisposeValue, Outcomes, PathKind, Verdict,
};
use crate::features::flow_graph::domain::Procedure;
use crate::features::points_to::domain::{LocationFactory, LocationId};

type Severity = (Classification, PathKind);

/// Collects verdicts for one analyzed procedure
pub struct VerdictCollector<'s> {
    factory: &'s LocationFactory,
    procedure: &'s Procedure,
    kind: DisposeAnalysisKind,
}

impl<'s> VerdictCollector<'s> {
    pub fn new(factory: &'s LocationFactory, procedure: &'s Procedure, kind: DisposeAnalysisKind) -> Self {
        Self {
            factory,
            procedure,
            kind,
        }
    }

    pub fn collect(
        &self,
        exit: Option<&AnalysisState>,
        unhandled: Option<&AnalysisState>,
        lost: &[LostReference],
    ) -> Vec<Verdict> {
        let mut at_exits: BTreeMap<LocationId, Severity> = BTreeMap::new();
        if let Some(state) = exit {
            for (loc, value) in state.dispose.iter() {
                self.offer(&mut at_exits, loc, value.normal, PathKind::AllPaths);
                self.offer(&mut at_exits, loc, value.exceptional, PathKind::ExceptionPathsOnly);
            }
        }
        if let Some(state) = unhandled {
            for (loc, value) in state.dispose.iter() {
                self.offer_exceptional(&mut at_exits, loc, value);
            }
        }
        self.coalesce_loop_carried(&mut at_exits, [exit, unhandled].into_iter().flatten());

        let mut candidates = at_exits;
        for event in lost {
            self.offer(&mut candidates, event.location, event.value.normal, PathKind::AllPaths);
            self.offer(
                &mut candidates,
                event.location,
                event.value.exceptional,
                PathKind::ExceptionPathsOnly,
            );
        }

        let mut verdicts: Vec<Verdict> = candidates
            .into_iter()
            .filter_map(|(loc, (classification, path_kind))| self.verdict(loc, classification, path_kind))
            .collect();
        verdicts.sort_by(|a, b| {
            (a.site.operation, a.rank(), a.location).cmp(&(b.site.operation, b.rank(), b.location))
        });
        verdicts.dedup_by(|later, earlier| later.site == earlier.site);
        verdicts
    }

    /// Both lattices of a state leaving through an exception
    fn offer_exceptional(&self, candidates: &mut BTreeMap<LocationId, Severity>, loc: LocationId, value: &DisposeValue) {
        self.offer(candidates, loc, value.normal, PathKind::ExceptionPathsOnly);
        self.offer(candidates, loc, value.exceptional, PathKind::ExceptionPathsOnly);
    }

    fn offer(
        &self,
        candidates: &mut BTreeMap<LocationId, Severity>,
        loc: LocationId,
        outcomes: Outcomes,
        path_kind: PathKind,
    ) {
        if !outcomes.is_open() || !self.factory.is_disposable(loc) {
            return;
        }
        let classification = if outcomes.is_discharged() {
            Classification::MaybeDisposed
        } else {
            Classification::NotDisposed
        };
        if path_kind == PathKind::ExceptionPathsOnly && !self.kind.tracks_exception_paths() {
            return;
        }
        if classification == Classification::MaybeDisposed && !self.kind.reports_maybe_disposed() {
            return;
        }

        let severity = (classification, path_kind);
        candidates
            .entry(loc)
            .and_modify(|existing| *existing = (*existing).min(severity))
            .or_insert(severity);
    }

    /// Fold loop-allocated candidates that share a holder symbol with a
    /// candidate allocated outside every loop
    ///
    /// The pre-loop candidate keeps its classification and takes the
    /// stronger path kind of the folded one.
    fn coalesce_loop_carried<'a>(
        &self,
        candidates: &mut BTreeMap<LocationId, Severity>,
        states: impl Iterator<Item = &'a AnalysisState>,
    ) {
        let in_loop = |loc: LocationId| self.factory.get(loc).map(|l| l.in_loop).unwrap_or(false);

        // (loop-carried, pre-loop)
        let mut folded: Vec<(LocationId, LocationId)> = Vec::new();
        for state in states {
            for (_, pts) in state.points_to.symbols() {
                let held: Vec<LocationId> = pts.tracked().filter(|l| candidates.contains_key(l)).collect();
                let (carried, anchors): (Vec<LocationId>, Vec<LocationId>) =
                    held.into_iter().partition(|l| in_loop(*l));
                for loc in &carried {
                    folded.extend(anchors.iter().map(|anchor| (*loc, *anchor)));
                }
            }
        }

        for (loc, anchor) in &folded {
            let Some((_, path_kind)) = candidates.get(loc).copied() else {
                continue;
            };
            if let Some(existing) = candidates.get_mut(anchor) {
                existing.1 = existing.1.min(path_kind);
            }
        }
        for (loc, _) in folded {
            candidates.remove(&loc);
        }
    }

    fn verdict(&self, loc: LocationId, classification: Classification, path_kind: PathKind) -> Option<Verdict> {
        let location = self.factory.get(loc)?;
        let site = location.report_site.or(location.site)?;
        let operation = self
            .procedure
            .cfg
            .find_operation(site.operation)
            .map(|(_, _, op)| op);

        let creation = operation
            .and_then(|op| op.syntax_first_line())
            .map(str::to_string)
            .or_else(|| location.type_info.as_ref().map(|ty| format!("new {}()", ty)))
            .unwrap_or_else(|| "<unknown>".to_string());
        let span = operation.and_then(|op| op.span);

        Some(Verdict::new(loc, site, classification, path_kind, creation, span))
    }
}
