use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::schema::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Assigned,
    InProgress,
    Submitted,
    Approved,
    Rejected,
    Cancelled,
}

/// Steps of the order flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    Assign,
    Start,
    Submit,
    Approve,
    Reject,
    Cancel,
}

impl OrderStatus {
    pub fn is_final(self) -> bool {
        matches!(self, OrderStatus::Approved | OrderStatus::Cancelled)
    }

    /// Field data may only change before the order is handed in.
    pub fn is_editable(self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::Assigned | OrderStatus::InProgress | OrderStatus::Rejected
        )
    }

    /// Status reached by applying `action`, or None when the flow does not allow it.
    pub fn apply(self, action: FlowAction) -> Option<OrderStatus> {
        use OrderStatus::*;

        match (action, self) {
            (FlowAction::Assign, New | Assigned | Rejected) => Some(Assigned),
            (FlowAction::Start, Assigned | Rejected) => Some(InProgress),
            (FlowAction::Submit, InProgress) => Some(Submitted),
            (FlowAction::Approve, Submitted) => Some(Approved),
            (FlowAction::Reject, Submitted) => Some(Rejected),
            (FlowAction::Cancel, status) if !status.is_final() => Some(Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Assigned => "assigned",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FlowAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowAction::Assign => "assign",
            FlowAction::Start => "start",
            FlowAction::Submit => "submit",
            FlowAction::Approve => "approve",
            FlowAction::Reject => "reject",
            FlowAction::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub schema_id: Uuid,
    pub reference: String,
    pub status: OrderStatus,
    pub priority: i32,
    pub assigned_to: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One field value of an order joined with its schema field
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderFieldValue {
    pub schema_field_id: Uuid,
    pub field_name: String,
    pub label: String,
    pub field_type: FieldType,
    pub is_required: bool,
    pub display_order: i32,
    pub value: Option<String>,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderFlowEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub actor: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use FlowAction::*;
    use OrderStatus::*;

    #[test]
    fn happy_path_through_the_flow() {
        let status = New.apply(Assign).unwrap();
        let status = status.apply(Start).unwrap();
        let status = status.apply(Submit).unwrap();
        assert_eq!(status.apply(Approve), Some(Approved));
    }

    #[test]
    fn rejected_orders_can_be_reworked() {
        let rejected = Submitted.apply(Reject).unwrap();
        assert_eq!(rejected, Rejected);
        assert!(rejected.is_editable());
        assert_eq!(rejected.apply(Start), Some(InProgress));
        assert_eq!(rejected.apply(Assign), Some(Assigned));
    }

    #[test]
    fn illegal_transitions_are_refused() {
        assert_eq!(New.apply(Start), None);
        assert_eq!(New.apply(Submit), None);
        assert_eq!(InProgress.apply(Approve), None);
        assert_eq!(Submitted.apply(Assign), None);
        assert_eq!(Approved.apply(Reject), None);
    }

    #[test]
    fn final_statuses_cannot_be_cancelled() {
        assert_eq!(Approved.apply(Cancel), None);
        assert_eq!(Cancelled.apply(Cancel), None);
        for status in [New, Assigned, InProgress, Submitted, Rejected] {
            assert_eq!(status.apply(Cancel), Some(Cancelled), "{:?}", status);
        }
    }

    #[test]
    fn submitted_orders_are_read_only() {
        assert!(!Submitted.is_editable());
        assert!(!Approved.is_editable());
        assert!(!Cancelled.is_editable());
        assert!(InProgress.is_editable());
    }
}
