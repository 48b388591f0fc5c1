use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ordercash_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, typed_aggregate_id,
};
use ordercash_events::Event;

use crate::bom::BillOfMaterial;

typed_aggregate_id!(
    /// Inventory item identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InventoryItemId
);

/// What an item is, which decides how orders consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    RawMaterial,
    Manufactured,
    Service,
}

impl ItemType {
    /// Services are sold but never held in stock.
    pub fn is_stock_keeping(self) -> bool {
        !matches!(self, ItemType::Service)
    }
}

/// Why a stock adjustment happened. Recorded for audit only; never drives control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Manual stock entry (receipts, counts, write-offs).
    Manual { note: String },
    /// Raw material consumed when an order entered production.
    ProductionConsumption { order_id: AggregateId },
    /// Exact inverse of a consumption, issued when an order in production is cancelled.
    ProductionReversal { order_id: AggregateId },
}

impl AdjustmentReason {
    pub fn manual(note: impl Into<String>) -> Self {
        Self::Manual { note: note.into() }
    }
}

/// Aggregate root: InventoryItem.
///
/// `quantity_on_hand` changes only through `AdjustStock`, the single ledger entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    item_type: ItemType,
    quantity_on_hand: Decimal,
    reorder_point: Decimal,
    reorder_quantity: Decimal,
    unit_cost: Decimal,
    sales_price: Decimal,
    bom: Option<BillOfMaterial>,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            item_type: ItemType::RawMaterial,
            quantity_on_hand: Decimal::ZERO,
            reorder_point: Decimal::ZERO,
            reorder_quantity: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
            sales_price: Decimal::ZERO,
            bom: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn quantity_on_hand(&self) -> Decimal {
        self.quantity_on_hand
    }

    pub fn reorder_point(&self) -> Decimal {
        self.reorder_point
    }

    pub fn reorder_quantity(&self) -> Decimal {
        self.reorder_quantity
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn sales_price(&self) -> Decimal {
        self.sales_price
    }

    /// The active bill of material, if this is a manufactured item that has one.
    pub fn active_bom(&self) -> Option<&BillOfMaterial> {
        self.bom.as_ref()
    }

    pub fn is_manufactured(&self) -> bool {
        self.item_type == ItemType::Manufactured
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    const AGGREGATE_TYPE: &'static str = "inventory.item";

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub item_type: ItemType,
    pub reorder_point: Decimal,
    pub reorder_quantity: Decimal,
    pub unit_cost: Decimal,
    pub sales_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub delta: Decimal,
    pub reason: AdjustmentReason,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DefineBom (replaces the active bill of material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineBom {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub bom: BillOfMaterial,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RetireBom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireBom {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    AdjustStock(AdjustStock),
    DefineBom(DefineBom),
    RetireBom(RetireBom),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub item_type: ItemType,
    pub reorder_point: Decimal,
    pub reorder_quantity: Decimal,
    pub unit_cost: Decimal,
    pub sales_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub delta: Decimal,
    /// Quantity on hand after this adjustment (audit snapshot).
    pub quantity_after: Decimal,
    pub reason: AdjustmentReason,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BomDefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomDefined {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub bom: BillOfMaterial,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BomRetired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomRetired {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    StockAdjusted(StockAdjusted),
    BomDefined(BomDefined),
    BomRetired(BomRetired),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::StockAdjusted(_) => "inventory.item.stock_adjusted",
            InventoryEvent::BomDefined(_) => "inventory.item.bom_defined",
            InventoryEvent::BomRetired(_) => "inventory.item.bom_retired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::BomDefined(e) => e.occurred_at,
            InventoryEvent::BomRetired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.item_type = e.item_type;
                self.quantity_on_hand = Decimal::ZERO;
                self.reorder_point = e.reorder_point;
                self.reorder_quantity = e.reorder_quantity;
                self.unit_cost = e.unit_cost;
                self.sales_price = e.sales_price;
                self.bom = None;
                self.created = true;
            }
            InventoryEvent::StockAdjusted(e) => {
                self.quantity_on_hand = e.quantity_after;
            }
            InventoryEvent::BomDefined(e) => {
                self.bom = Some(e.bom.clone());
            }
            InventoryEvent::BomRetired(_) => {
                self.bom = None;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::DefineBom(cmd) => self.handle_define_bom(cmd),
            InventoryCommand::RetireBom(cmd) => self.handle_retire_bom(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_target(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        for (field, value) in [
            ("reorder_point", cmd.reorder_point),
            ("reorder_quantity", cmd.reorder_quantity),
            ("unit_cost", cmd.unit_cost),
            ("sales_price", cmd.sales_price),
        ] {
            if value < Decimal::ZERO {
                return Err(DomainError::validation(format!("{field} cannot be negative")));
            }
        }

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.trim().to_string(),
            item_type: cmd.item_type,
            reorder_point: cmd.reorder_point,
            reorder_quantity: cmd.reorder_quantity,
            unit_cost: cmd.unit_cost,
            sales_price: cmd.sales_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.item_id)?;

        if cmd.delta.is_zero() {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        if !self.item_type.is_stock_keeping() {
            return Err(DomainError::validation("service items do not carry stock"));
        }

        let quantity_after = self
            .quantity_on_hand
            .checked_add(cmd.delta)
            .ok_or_else(DomainError::overflow)?;
        if quantity_after < Decimal::ZERO {
            return Err(DomainError::InsufficientStock {
                item_id: self.id.0,
                on_hand: self.quantity_on_hand,
                requested: -cmd.delta,
            });
        }

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            delta: cmd.delta,
            quantity_after,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_define_bom(&self, cmd: &DefineBom) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.item_id)?;

        if !self.is_manufactured() {
            return Err(DomainError::validation(
                "only manufactured items can own a bill of material",
            ));
        }
        cmd.bom.validate(self.id)?;

        if self.bom.as_ref() == Some(&cmd.bom) {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::BomDefined(BomDefined {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            bom: cmd.bom.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retire_bom(&self, cmd: &RetireBom) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.item_id)?;

        if self.bom.is_none() {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::BomRetired(BomRetired {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::BomLine;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_item(tenant_id: TenantId, item_type: ItemType) -> InventoryItem {
        let item_id = InventoryItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        let events = item
            .handle(&InventoryCommand::CreateItem(CreateItem {
                tenant_id,
                item_id,
                sku: "RM-001".to_string(),
                name: "Steel sheet".to_string(),
                item_type,
                reorder_point: Decimal::from(5),
                reorder_quantity: Decimal::from(20),
                unit_cost: Decimal::new(1250, 2),
                sales_price: Decimal::ZERO,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            item.apply(e);
        }
        item
    }

    fn adjust(item: &InventoryItem, tenant_id: TenantId, delta: Decimal) -> Result<Vec<InventoryEvent>, DomainError> {
        item.handle(&InventoryCommand::AdjustStock(AdjustStock {
            tenant_id,
            item_id: item.id_typed(),
            delta,
            reason: AdjustmentReason::manual("test"),
            occurred_at: test_time(),
        }))
    }

    #[test]
    fn create_item_starts_with_zero_stock() {
        let tenant_id = TenantId::new();
        let item = created_item(tenant_id, ItemType::RawMaterial);

        assert!(item.is_created());
        assert_eq!(item.quantity_on_hand(), Decimal::ZERO);
        assert_eq!(item.sku(), "RM-001");
        assert_eq!(item.version(), 1);
    }

    #[test]
    fn creating_twice_is_a_conflict() {
        let tenant_id = TenantId::new();
        let item = created_item(tenant_id, ItemType::RawMaterial);
        let err = item
            .handle(&InventoryCommand::CreateItem(CreateItem {
                tenant_id,
                item_id: item.id_typed(),
                sku: "X".to_string(),
                name: "X".to_string(),
                item_type: ItemType::RawMaterial,
                reorder_point: Decimal::ZERO,
                reorder_quantity: Decimal::ZERO,
                unit_cost: Decimal::ZERO,
                sales_price: Decimal::ZERO,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn adjust_records_quantity_after_and_reason() {
        let tenant_id = TenantId::new();
        let mut item = created_item(tenant_id, ItemType::RawMaterial);

        let events = adjust(&item, tenant_id, Decimal::from(10)).unwrap();
        match &events[0] {
            InventoryEvent::StockAdjusted(e) => {
                assert_eq!(e.quantity_after, Decimal::from(10));
                assert_eq!(e.reason, AdjustmentReason::manual("test"));
            }
            other => panic!("expected StockAdjusted, got {other:?}"),
        }
        item.apply(&events[0]);
        assert_eq!(item.quantity_on_hand(), Decimal::from(10));
    }

    #[test]
    fn overflowing_quantity_is_rejected() {
        let tenant_id = TenantId::new();
        let mut item = created_item(tenant_id, ItemType::RawMaterial);
        for e in adjust(&item, tenant_id, Decimal::MAX).unwrap() {
            item.apply(&e);
        }

        let err = adjust(&item, tenant_id, Decimal::MAX).unwrap_err();
        assert_eq!(err, DomainError::overflow());
        assert_eq!(item.quantity_on_hand(), Decimal::MAX);
    }

    #[test]
    fn negative_result_is_insufficient_stock() {
        let tenant_id = TenantId::new();
        let mut item = created_item(tenant_id, ItemType::RawMaterial);
        for e in adjust(&item, tenant_id, Decimal::from(4)).unwrap() {
            item.apply(&e);
        }

        let err = adjust(&item, tenant_id, Decimal::from(-6)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                item_id: item.id_typed().0,
                on_hand: Decimal::from(4),
                requested: Decimal::from(6),
            }
        );
        assert_eq!(item.quantity_on_hand(), Decimal::from(4));
    }

    #[test]
    fn draining_to_exactly_zero_is_allowed() {
        let tenant_id = TenantId::new();
        let mut item = created_item(tenant_id, ItemType::RawMaterial);
        for e in adjust(&item, tenant_id, Decimal::from(3)).unwrap() {
            item.apply(&e);
        }
        for e in adjust(&item, tenant_id, Decimal::from(-3)).unwrap() {
            item.apply(&e);
        }
        assert_eq!(item.quantity_on_hand(), Decimal::ZERO);
    }

    #[test]
    fn zero_delta_and_service_items_are_rejected() {
        let tenant_id = TenantId::new();
        let raw = created_item(tenant_id, ItemType::RawMaterial);
        assert!(matches!(
            adjust(&raw, tenant_id, Decimal::ZERO),
            Err(DomainError::Validation(_))
        ));

        let service = created_item(tenant_id, ItemType::Service);
        assert!(matches!(
            adjust(&service, tenant_id, Decimal::ONE),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn adjust_from_another_tenant_is_rejected() {
        let item = created_item(TenantId::new(), ItemType::RawMaterial);
        let err = adjust(&item, TenantId::new(), Decimal::ONE).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn only_manufactured_items_own_a_bom() {
        let tenant_id = TenantId::new();
        let raw = created_item(tenant_id, ItemType::RawMaterial);
        let bom = BillOfMaterial::new(
            vec![BomLine::new(InventoryItemId::generate(), Decimal::ONE)],
            Decimal::ZERO,
        );
        let err = raw
            .handle(&InventoryCommand::DefineBom(DefineBom {
                tenant_id,
                item_id: raw.id_typed(),
                bom,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn define_then_retire_bom() {
        let tenant_id = TenantId::new();
        let mut item = created_item(tenant_id, ItemType::Manufactured);
        let bom = BillOfMaterial::new(
            vec![BomLine::new(InventoryItemId::generate(), Decimal::from(2))],
            Decimal::new(500, 2),
        );

        let events = item
            .handle(&InventoryCommand::DefineBom(DefineBom {
                tenant_id,
                item_id: item.id_typed(),
                bom: bom.clone(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            item.apply(e);
        }
        assert_eq!(item.active_bom(), Some(&bom));

        let events = item
            .handle(&InventoryCommand::RetireBom(RetireBom {
                tenant_id,
                item_id: item.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            item.apply(e);
        }
        assert!(item.active_bom().is_none());

        // retiring again is a no-op
        let events = item
            .handle(&InventoryCommand::RetireBom(RetireBom {
                tenant_id,
                item_id: item.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: quantity on hand equals the sum of every accepted delta and never goes
        /// negative, whatever sequence of adjustments is requested.
        #[test]
        fn quantity_is_sum_of_applied_deltas(deltas in prop::collection::vec(-50i64..50i64, 1..40)) {
            let tenant_id = TenantId::new();
            let mut item = created_item(tenant_id, ItemType::RawMaterial);
            let mut applied = Decimal::ZERO;

            for delta in deltas {
                let delta = Decimal::from(delta);
                match adjust(&item, tenant_id, delta) {
                    Ok(events) => {
                        for e in &events {
                            item.apply(e);
                        }
                        applied += delta;
                    }
                    Err(DomainError::InsufficientStock { .. }) => {
                        prop_assert!(item.quantity_on_hand() + delta < Decimal::ZERO);
                    }
                    Err(DomainError::Validation(_)) => prop_assert!(delta.is_zero()),
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
                prop_assert!(item.quantity_on_hand() >= Decimal::ZERO);
            }

            prop_assert_eq!(item.quantity_on_hand(), applied);
        }
    }
}
