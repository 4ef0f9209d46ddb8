//! The scale-order dispatcher (C9): a lazy, finite, non-restartable
//! iterator over (persona × active trait × scale-order), sourcing
//! personas from a streaming, keyset-paginated repository so memory use
//! stays bounded regardless of dataset size (§4.9, §9 "streaming
//! personas"). Pins the Open Question in §9: each (persona, trait,
//! scale-order) triple is considered — and, unless already completed,
//! emitted — at most once, regardless of `dual_fraction`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use bench_core::progress::CompletedKey;
use bench_core::types::ids::{DatasetId, RunId};
use bench_core::types::rows::TraitRow;
use bench_core::types::scale::{ScaleMode, ScaleOrder};
use bench_core::WorkItem;
use bench_storage::queries::personas::{self, PersonaRow, PAGE_SIZE};
use bench_storage::StorageEngine;

/// Streams personas belonging to a dataset in `persona_uuid` ascending
/// order, buffering one page (≈1000 rows) at a time.
struct PersonaStream {
    engine: Arc<StorageEngine>,
    dataset_id: DatasetId,
    attr_generation_run_id: Option<i64>,
    buffer: VecDeque<PersonaRow>,
    cursor: Option<String>,
    exhausted: bool,
}

impl PersonaStream {
    fn new(engine: Arc<StorageEngine>, dataset_id: DatasetId, attr_generation_run_id: Option<i64>) -> Self {
        Self { engine, dataset_id, attr_generation_run_id, buffer: VecDeque::new(), cursor: None, exhausted: false }
    }

    fn fill(&mut self) {
        if self.exhausted || !self.buffer.is_empty() {
            return;
        }
        let page = self
            .engine
            .with_reader(|conn| personas::list_page(conn, self.dataset_id, self.cursor.as_deref(), PAGE_SIZE))
            .unwrap_or_default();

        if page.len() < PAGE_SIZE as usize {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(last.persona_uuid.clone());
        }
        self.buffer.extend(page);
    }
}

impl Iterator for PersonaStream {
    type Item = PersonaRow;

    fn next(&mut self) -> Option<PersonaRow> {
        self.fill();
        let mut row = self.buffer.pop_front()?;
        let _ = self.engine.with_reader(|conn| {
            personas::enrich_context(conn, &row.persona_uuid, self.attr_generation_run_id, &mut row.context)
        });
        Some(row)
    }
}

/// Deterministic hash of `(run_id, persona_uuid, trait_id)`, mapped onto
/// the unit interval via `xxh3`. Falling inside the first `dual_fraction`
/// of the interval selects this triple for the secondary scale order.
fn secondary_selected(run_id: RunId, persona_uuid: &str, trait_id_value: i64, dual_fraction: f64) -> bool {
    if dual_fraction <= 0.0 {
        return false;
    }
    let key = format!("{}:{}:{}", run_id.0, persona_uuid, trait_id_value);
    let digest = xxhash_rust::xxh3::xxh3_64(key.as_bytes());
    let unit = digest as f64 / u64::MAX as f64;
    unit < dual_fraction
}

pub struct ScaleOrderDispatcher {
    run_id: RunId,
    personas: PersonaStream,
    active_traits: Arc<Vec<TraitRow>>,
    scale_mode: ScaleMode,
    dual_fraction: f64,
    completed_keys: Arc<HashSet<CompletedKey>>,
    current_persona: Option<PersonaRow>,
    trait_idx: usize,
    /// Pending `(trait_idx, ScaleOrder)` items for the current persona,
    /// queued so both the primary and secondary order for one trait are
    /// drained before moving to the next trait.
    pending: VecDeque<ScaleOrder>,
}

impl ScaleOrderDispatcher {
    pub fn new(
        engine: Arc<StorageEngine>,
        run_id: RunId,
        dataset_id: DatasetId,
        attr_generation_run_id: Option<i64>,
        active_traits: Vec<TraitRow>,
        scale_mode: ScaleMode,
        dual_fraction: f64,
        completed_keys: HashSet<CompletedKey>,
    ) -> Self {
        Self {
            run_id,
            personas: PersonaStream::new(engine, dataset_id, attr_generation_run_id),
            active_traits: Arc::new(active_traits),
            scale_mode,
            dual_fraction: dual_fraction.clamp(0.0, 1.0),
            completed_keys: Arc::new(completed_keys),
            current_persona: None,
            trait_idx: 0,
            pending: VecDeque::new(),
        }
    }

    /// The primary (unconditional) scale order and, when `scale_mode =
    /// dual`, the secondary order this (persona, trait) pair would use
    /// if selected.
    fn orders_for(&self) -> (ScaleOrder, Option<ScaleOrder>) {
        match self.scale_mode {
            ScaleMode::In => (ScaleOrder::In, None),
            ScaleMode::Rev => (ScaleOrder::Rev, None),
            ScaleMode::Dual => (ScaleOrder::In, Some(ScaleOrder::Rev)),
        }
    }

    fn is_completed(&self, persona_uuid: &str, case_id: &str, order: ScaleOrder) -> bool {
        self.completed_keys.contains(&(persona_uuid.to_string().into(), case_id.to_string(), order))
    }
}

impl Iterator for ScaleOrderDispatcher {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        loop {
            if self.current_persona.is_none() {
                self.current_persona = self.personas.next();
                self.trait_idx = 0;
                self.pending.clear();
                self.current_persona.as_ref()?;
            }

            if self.pending.is_empty() {
                let Some(trait_row) = self.active_traits.get(self.trait_idx) else {
                    self.current_persona = None;
                    continue;
                };
                self.trait_idx += 1;

                let (primary, secondary) = self.orders_for();
                self.pending.push_back(primary);

                if let Some(secondary) = secondary {
                    let persona = self.current_persona.as_ref().expect("checked above");
                    if secondary_selected(self.run_id, &persona.persona_uuid, trait_row.trait_id.0, self.dual_fraction) {
                        self.pending.push_back(secondary);
                    }
                }
            }

            let Some(order) = self.pending.pop_front() else { continue };
            let persona = self.current_persona.as_ref().expect("checked above");
            let trait_row = &self.active_traits[self.trait_idx - 1];
            let case_id = bench_core::progress::case_id_for_trait(trait_row.trait_id);

            if self.is_completed(&persona.persona_uuid, &case_id, order) {
                continue;
            }

            return Some(WorkItem {
                key: bench_core::WorkItemKey {
                    run_id: self.run_id,
                    persona_uuid: persona.persona_uuid.clone().into(),
                    trait_id: trait_row.trait_id,
                    scale_order: order,
                },
                persona_context: persona.context.clone(),
                adjective: trait_row.adjective.clone(),
                case_template: trait_row.case_template.clone(),
                attempt: 1,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_core::types::ids::TraitId;
    use bench_storage::queries;

    fn engine_with_personas(n: usize) -> (Arc<StorageEngine>, DatasetId) {
        let engine = Arc::new(StorageEngine::open_in_memory().unwrap());
        let dataset_id = engine.with_writer(|conn| queries::datasets::insert(conn, "d", "pool", &serde_json::json!({}))).unwrap();
        engine
            .with_writer(|conn| {
                for i in 0..n {
                    let uuid = format!("p{i:04}");
                    queries::personas::insert(conn, &uuid, &Default::default())?;
                    queries::datasets::add_persona(conn, dataset_id, &uuid)?;
                }
                Ok(())
            })
            .unwrap();
        (engine, dataset_id)
    }

    fn traits(n: usize) -> Vec<TraitRow> {
        (0..n)
            .map(|i| TraitRow {
                trait_id: TraitId(i as i64 + 1),
                adjective: format!("adj{i}"),
                case_template: None,
                category: None,
                valence: None,
                is_active: true,
            })
            .collect()
    }

    #[test]
    fn emits_one_in_item_per_persona_trait_pair_in_mode_in() {
        let (engine, dataset_id) = engine_with_personas(2);
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(2),
            ScaleMode::In,
            0.0,
            HashSet::new(),
        );
        let items: Vec<_> = dispatcher.collect();
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|i| i.key.scale_order == ScaleOrder::In));
    }

    #[test]
    fn never_emits_rev_when_scale_mode_in() {
        let (engine, dataset_id) = engine_with_personas(5);
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(3),
            ScaleMode::In,
            1.0,
            HashSet::new(),
        );
        assert!(dispatcher.into_iter().all(|i| i.key.scale_order == ScaleOrder::In));
    }

    #[test]
    fn dual_fraction_one_emits_both_orders_for_every_pair() {
        let (engine, dataset_id) = engine_with_personas(3);
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(2),
            ScaleMode::Dual,
            1.0,
            HashSet::new(),
        );
        let items: Vec<_> = dispatcher.collect();
        assert_eq!(items.len(), 3 * 2 * 2);
        let rev_count = items.iter().filter(|i| i.key.scale_order == ScaleOrder::Rev).count();
        assert_eq!(rev_count, 3 * 2);
    }

    #[test]
    fn dual_fraction_zero_never_emits_secondary() {
        let (engine, dataset_id) = engine_with_personas(4);
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(2),
            ScaleMode::Dual,
            0.0,
            HashSet::new(),
        );
        let items: Vec<_> = dispatcher.collect();
        assert_eq!(items.len(), 4 * 2);
    }

    #[test]
    fn never_emits_the_same_triple_twice() {
        let (engine, dataset_id) = engine_with_personas(3);
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(2),
            ScaleMode::Dual,
            0.6,
            HashSet::new(),
        );
        let items: Vec<_> = dispatcher.collect();
        let mut seen = HashSet::new();
        for item in &items {
            assert!(seen.insert((item.key.persona_uuid.clone(), item.key.trait_id, item.key.scale_order)));
        }
    }

    #[test]
    fn resume_skips_completed_keys() {
        let (engine, dataset_id) = engine_with_personas(1);
        let mut completed = HashSet::new();
        completed.insert((bench_core::types::ids::PersonaUuid("p0000".to_string()), "1".to_string(), ScaleOrder::In));
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(2),
            ScaleMode::In,
            0.0,
            completed,
        );
        let items: Vec<_> = dispatcher.collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key.trait_id, TraitId(2));
    }

    #[test]
    fn scale_mode_rev_swaps_primary_order() {
        let (engine, dataset_id) = engine_with_personas(2);
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(1),
            ScaleMode::Rev,
            0.0,
            HashSet::new(),
        );
        let items: Vec<_> = dispatcher.collect();
        assert!(items.iter().all(|i| i.key.scale_order == ScaleOrder::Rev));
    }

    #[test]
    fn pagination_bound_does_not_lose_personas_beyond_one_page() {
        let (engine, dataset_id) = engine_with_personas(3);
        let dispatcher = ScaleOrderDispatcher::new(
            engine,
            RunId(1),
            dataset_id,
            None,
            traits(1),
            ScaleMode::In,
            0.0,
            HashSet::new(),
        );
        let items: Vec<_> = dispatcher.collect();
        assert_eq!(items.len(), 3);
    }
}
