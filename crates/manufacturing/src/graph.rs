//! In-memory directed component graph.
//!
//! Built once per call from the current item states. Every walk is iterative with an explicit
//! stack, so graph depth never turns into call-stack depth.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rust_decimal::Decimal;

use ordercash_core::DomainError;
use ordercash_inventory::{BillOfMaterial, InventoryItem, InventoryItemId, ItemType};

/// Raw-material quantities keyed by item, in stable id order.
pub type MaterialRequirements = BTreeMap<InventoryItemId, Decimal>;

/// What the graph needs to know about one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomNode {
    pub item_type: ItemType,
    pub unit_cost: Decimal,
    pub bom: Option<BillOfMaterial>,
}

impl From<&InventoryItem> for BomNode {
    fn from(item: &InventoryItem) -> Self {
        Self {
            item_type: item.item_type(),
            unit_cost: item.unit_cost(),
            bom: item.active_bom().cloned(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BomGraph {
    nodes: HashMap<InventoryItemId, BomNode>,
}

enum Visit {
    Enter(InventoryItemId),
    Exit(InventoryItemId),
}

impl BomGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a InventoryItem>,
    {
        let mut graph = Self::new();
        for item in items {
            graph.insert(item.id_typed(), BomNode::from(item));
        }
        graph
    }

    pub fn insert(&mut self, id: InventoryItemId, node: BomNode) {
        self.nodes.insert(id, node);
    }

    pub fn contains(&self, id: InventoryItemId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Component ids referenced by some BOM in the graph but not yet loaded into it.
    pub fn unresolved(&self) -> BTreeSet<InventoryItemId> {
        self.nodes
            .values()
            .filter_map(|n| n.bom.as_ref())
            .flat_map(|bom| bom.component_ids())
            .filter(|id| !self.nodes.contains_key(id))
            .collect()
    }

    /// Copy of this graph with `owner`'s active BOM replaced by `bom`.
    pub fn with_bom(&self, owner: InventoryItemId, bom: BillOfMaterial) -> Result<Self, DomainError> {
        let mut candidate = self.clone();
        let node = candidate
            .nodes
            .get_mut(&owner)
            .ok_or_else(|| DomainError::invariant(format!("item {owner} missing from graph")))?;
        node.bom = Some(bom);
        Ok(candidate)
    }

    fn node(&self, id: InventoryItemId) -> Result<&BomNode, DomainError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| DomainError::invariant(format!("component {id} missing from graph")))
    }

    fn children(&self, id: InventoryItemId) -> impl Iterator<Item = InventoryItemId> + '_ {
        self.nodes
            .get(&id)
            .and_then(|n| n.bom.as_ref())
            .into_iter()
            .flat_map(|bom| bom.lines.iter().rev().map(|l| l.component_id))
    }

    /// Fails with `CyclicBom` if any path from `root` revisits an item already on that path.
    ///
    /// The reported path runs from the first repeated item back to itself.
    pub fn check_acyclic(&self, root: InventoryItemId) -> Result<(), DomainError> {
        let mut stack = vec![Visit::Enter(root)];
        let mut path: Vec<InventoryItemId> = Vec::new();
        let mut on_path: HashSet<InventoryItemId> = HashSet::new();
        let mut done: HashSet<InventoryItemId> = HashSet::new();

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if on_path.contains(&id) {
                        let start = path.iter().position(|p| *p == id).unwrap_or(0);
                        let mut cycle: Vec<_> = path[start..].iter().map(|p| p.0).collect();
                        cycle.push(id.0);
                        return Err(DomainError::CyclicBom { path: cycle });
                    }
                    if done.contains(&id) {
                        continue;
                    }
                    path.push(id);
                    on_path.insert(id);
                    stack.push(Visit::Exit(id));
                    stack.extend(self.children(id).map(Visit::Enter));
                }
                Visit::Exit(id) => {
                    path.pop();
                    on_path.remove(&id);
                    done.insert(id);
                }
            }
        }

        Ok(())
    }

    /// Raw-material requirements for producing `units` of `root`.
    ///
    /// Quantities reaching the same raw item over several paths are summed. Services are not
    /// materials and are skipped.
    pub fn explode(
        &self,
        root: InventoryItemId,
        units: Decimal,
    ) -> Result<MaterialRequirements, DomainError> {
        if units <= Decimal::ZERO {
            return Err(DomainError::validation("units must be positive"));
        }
        self.check_acyclic(root)?;

        if self.node(root)?.item_type != ItemType::Manufactured {
            return Err(DomainError::validation(format!(
                "item {root} is not manufactured"
            )));
        }

        let mut requirements = MaterialRequirements::new();
        let mut stack = vec![(root, units)];

        while let Some((id, multiplier)) = stack.pop() {
            let node = self.node(id)?;
            match node.item_type {
                ItemType::Manufactured => {
                    let bom = node
                        .bom
                        .as_ref()
                        .ok_or(DomainError::IncompleteBom { item_id: id.0 })?;
                    for line in bom.lines.iter().rev() {
                        let quantity = multiplier
                            .checked_mul(line.quantity_per_unit)
                            .ok_or_else(DomainError::overflow)?;
                        stack.push((line.component_id, quantity));
                    }
                }
                ItemType::RawMaterial => {
                    let total = requirements.entry(id).or_insert(Decimal::ZERO);
                    *total = total.checked_add(multiplier).ok_or_else(DomainError::overflow)?;
                }
                ItemType::Service => {}
            }
        }

        Ok(requirements)
    }

    /// Unit cost of `root`: purchased items cost their `unit_cost`; a manufactured item costs
    /// its components times their per-unit quantities plus its own labor. Unrounded.
    pub fn roll_up_cost(&self, root: InventoryItemId) -> Result<Decimal, DomainError> {
        self.check_acyclic(root)?;

        let mut costs: HashMap<InventoryItemId, Decimal> = HashMap::new();
        let mut stack = vec![Visit::Enter(root)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if costs.contains_key(&id) {
                        continue;
                    }
                    let node = self.node(id)?;
                    if node.item_type != ItemType::Manufactured {
                        costs.insert(id, node.unit_cost);
                        continue;
                    }
                    if node.bom.is_none() {
                        return Err(DomainError::IncompleteBom { item_id: id.0 });
                    }
                    stack.push(Visit::Exit(id));
                    stack.extend(
                        self.children(id)
                            .filter(|c| !costs.contains_key(c))
                            .map(Visit::Enter),
                    );
                }
                Visit::Exit(id) => {
                    let bom = self
                        .node(id)?
                        .bom
                        .as_ref()
                        .ok_or(DomainError::IncompleteBom { item_id: id.0 })?;
                    let mut cost = bom.labor_cost;
                    for line in &bom.lines {
                        let child = costs.get(&line.component_id).copied().ok_or_else(|| {
                            DomainError::invariant(format!(
                                "cost of {} not resolved",
                                line.component_id
                            ))
                        })?;
                        cost = child
                            .checked_mul(line.quantity_per_unit)
                            .and_then(|c| cost.checked_add(c))
                            .ok_or_else(DomainError::overflow)?;
                    }
                    costs.insert(id, cost);
                }
            }
        }

        costs
            .get(&root)
            .copied()
            .ok_or_else(|| DomainError::invariant(format!("cost of {root} not resolved")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordercash_inventory::BomLine;
    use proptest::prelude::*;

    fn raw(cost: i64) -> BomNode {
        BomNode {
            item_type: ItemType::RawMaterial,
            unit_cost: Decimal::from(cost),
            bom: None,
        }
    }

    fn manufactured(lines: Vec<(InventoryItemId, Decimal)>, labor: Decimal) -> BomNode {
        BomNode {
            item_type: ItemType::Manufactured,
            unit_cost: Decimal::ZERO,
            bom: Some(BillOfMaterial::new(
                lines
                    .into_iter()
                    .map(|(id, q)| BomLine::new(id, q))
                    .collect(),
                labor,
            )),
        }
    }

    /// bike -> 2 wheel + 1 frame(steel 3) ; wheel -> 1 rim(steel 1) + 36 spoke
    struct Bike {
        graph: BomGraph,
        bike: InventoryItemId,
        wheel: InventoryItemId,
        steel: InventoryItemId,
        spoke: InventoryItemId,
    }

    fn bike() -> Bike {
        let steel = InventoryItemId::generate();
        let spoke = InventoryItemId::generate();
        let wheel = InventoryItemId::generate();
        let bike = InventoryItemId::generate();

        let mut graph = BomGraph::new();
        graph.insert(steel, raw(10));
        graph.insert(spoke, raw(1));
        graph.insert(
            wheel,
            manufactured(
                vec![(steel, Decimal::ONE), (spoke, Decimal::from(36))],
                Decimal::from(5),
            ),
        );
        graph.insert(
            bike,
            manufactured(
                vec![(wheel, Decimal::from(2)), (steel, Decimal::from(3))],
                Decimal::from(20),
            ),
        );

        Bike {
            graph,
            bike,
            wheel,
            steel,
            spoke,
        }
    }

    /// Eleven assemblies, each needing 1000 of the one below, over a single raw item.
    fn thousandfold_chain() -> (BomGraph, InventoryItemId) {
        let mut graph = BomGraph::new();
        let mut current = InventoryItemId::generate();
        graph.insert(current, raw(1));
        for _ in 0..11 {
            let id = InventoryItemId::generate();
            graph.insert(id, manufactured(vec![(current, Decimal::from(1000))], Decimal::ZERO));
            current = id;
        }
        (graph, current)
    }

    #[test]
    fn explode_overflow_is_an_error() {
        let (graph, top) = thousandfold_chain();
        assert_eq!(graph.explode(top, Decimal::ONE), Err(DomainError::overflow()));
    }

    #[test]
    fn roll_up_overflow_is_an_error() {
        let (graph, top) = thousandfold_chain();
        assert_eq!(graph.roll_up_cost(top), Err(DomainError::overflow()));
    }

    #[test]
    fn explode_sums_contributions_over_paths() {
        let b = bike();
        let req = b.graph.explode(b.bike, Decimal::from(2)).unwrap();

        // steel: 2 * (3 + 2*1) = 10, spokes: 2 * 2 * 36 = 144
        assert_eq!(req.get(&b.steel), Some(&Decimal::from(10)));
        assert_eq!(req.get(&b.spoke), Some(&Decimal::from(144)));
        assert!(!req.contains_key(&b.wheel));
        assert_eq!(req.len(), 2);
    }

    #[test]
    fn roll_up_cost_includes_labor_at_every_level() {
        let b = bike();
        // wheel = 10 + 36 + 5 = 51; bike = 2*51 + 3*10 + 20 = 152
        assert_eq!(b.graph.roll_up_cost(b.wheel).unwrap(), Decimal::from(51));
        assert_eq!(b.graph.roll_up_cost(b.bike).unwrap(), Decimal::from(152));
        assert_eq!(b.graph.roll_up_cost(b.steel).unwrap(), Decimal::from(10));
    }

    #[test]
    fn services_cost_but_are_not_materials() {
        let steel = InventoryItemId::generate();
        let assembly = InventoryItemId::generate();
        let product = InventoryItemId::generate();

        let mut graph = BomGraph::new();
        graph.insert(steel, raw(4));
        graph.insert(
            assembly,
            BomNode {
                item_type: ItemType::Service,
                unit_cost: Decimal::from(7),
                bom: None,
            },
        );
        graph.insert(
            product,
            manufactured(
                vec![(steel, Decimal::ONE), (assembly, Decimal::ONE)],
                Decimal::ZERO,
            ),
        );

        let req = graph.explode(product, Decimal::ONE).unwrap();
        assert_eq!(req.len(), 1);
        assert_eq!(graph.roll_up_cost(product).unwrap(), Decimal::from(11));
    }

    #[test]
    fn transitive_cycle_is_reported_with_its_path() {
        let a = InventoryItemId::generate();
        let b = InventoryItemId::generate();
        let c = InventoryItemId::generate();

        let mut graph = BomGraph::new();
        graph.insert(a, manufactured(vec![(b, Decimal::ONE)], Decimal::ZERO));
        graph.insert(b, manufactured(vec![(c, Decimal::ONE)], Decimal::ZERO));
        graph.insert(c, manufactured(vec![(a, Decimal::ONE)], Decimal::ZERO));

        let err = graph.explode(a, Decimal::ONE).unwrap_err();
        assert_eq!(
            err,
            DomainError::CyclicBom {
                path: vec![a.0, b.0, c.0, a.0]
            }
        );
        assert!(matches!(
            graph.roll_up_cost(b),
            Err(DomainError::CyclicBom { .. })
        ));
    }

    #[test]
    fn shared_subassembly_is_not_a_cycle() {
        let b = bike();
        // wheel is reached directly; steel is reached twice (diamond)
        assert!(b.graph.check_acyclic(b.bike).is_ok());
    }

    #[test]
    fn candidate_bom_introducing_cycle_is_detected() {
        let b = bike();
        let candidate = b
            .graph
            .with_bom(b.wheel, BillOfMaterial::new(vec![BomLine::new(b.bike, Decimal::ONE)], Decimal::ZERO))
            .unwrap();
        assert!(matches!(
            candidate.check_acyclic(b.wheel),
            Err(DomainError::CyclicBom { .. })
        ));
        // the original graph is untouched
        assert!(b.graph.check_acyclic(b.wheel).is_ok());
    }

    #[test]
    fn manufactured_component_without_bom_is_incomplete() {
        let sub = InventoryItemId::generate();
        let top = InventoryItemId::generate();
        let mut graph = BomGraph::new();
        graph.insert(
            sub,
            BomNode {
                item_type: ItemType::Manufactured,
                unit_cost: Decimal::ZERO,
                bom: None,
            },
        );
        graph.insert(top, manufactured(vec![(sub, Decimal::ONE)], Decimal::ZERO));

        assert_eq!(
            graph.explode(top, Decimal::ONE),
            Err(DomainError::IncompleteBom { item_id: sub.0 })
        );
        assert_eq!(
            graph.roll_up_cost(top),
            Err(DomainError::IncompleteBom { item_id: sub.0 })
        );
    }

    #[test]
    fn unresolved_lists_missing_components() {
        let missing = InventoryItemId::generate();
        let top = InventoryItemId::generate();
        let mut graph = BomGraph::new();
        graph.insert(top, manufactured(vec![(missing, Decimal::ONE)], Decimal::ZERO));

        assert_eq!(graph.unresolved().into_iter().collect::<Vec<_>>(), vec![missing]);
        graph.insert(missing, raw(1));
        assert!(graph.unresolved().is_empty());
    }

    #[test]
    fn non_positive_units_are_rejected() {
        let b = bike();
        assert!(matches!(
            b.graph.explode(b.bike, Decimal::ZERO),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            b.graph.explode(b.steel, Decimal::ONE),
            Err(DomainError::Validation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: explosion of a random layered DAG is deterministic and linear in units.
        #[test]
        fn explode_is_deterministic(
            raw_count in 1usize..6,
            layers in prop::collection::vec(
                prop::collection::vec((0usize..100, 1i64..5), 1..4),
                1..5,
            ),
            units in 1i64..20,
        ) {
            let mut graph = BomGraph::new();
            let mut lower: Vec<InventoryItemId> = (0..raw_count)
                .map(|_| {
                    let id = InventoryItemId::generate();
                    graph.insert(id, raw(1));
                    id
                })
                .collect();

            let mut top = lower[0];
            for layer in &layers {
                let id = InventoryItemId::generate();
                let mut lines: Vec<(InventoryItemId, Decimal)> = Vec::new();
                for (pick, qty) in layer {
                    let component = lower[pick % lower.len()];
                    if lines.iter().all(|(c, _)| *c != component) {
                        lines.push((component, Decimal::from(*qty)));
                    }
                }
                graph.insert(id, manufactured(lines, Decimal::ZERO));
                lower.push(id);
                top = id;
            }

            let first = graph.explode(top, Decimal::from(units)).unwrap();
            let second = graph.explode(top, Decimal::from(units)).unwrap();
            prop_assert_eq!(&first, &second);

            let single = graph.explode(top, Decimal::ONE).unwrap();
            for (id, qty) in &single {
                prop_assert_eq!(first.get(id).copied(), Some(*qty * Decimal::from(units)));
            }
        }
    }
}
