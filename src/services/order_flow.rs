//! Status transitions of an order and their history.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::audit;
use super::order::{load_order, ORDER_COLUMNS};
use super::order_data::load_values;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::order::{FlowAction, Order, OrderFieldValue, OrderFlowEvent, OrderStatus};
use crate::middleware::ValidatedUser;
use crate::result::{ok, ServiceError, ServiceResult, ValidationError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowRequest {
    /// Assignee, for `assign`
    pub user_id: Option<Uuid>,
    /// Required for `reject`
    pub reason: Option<String>,
    pub note: Option<String>,
}

#[async_trait]
pub trait OrderFlowService: Send + Sync {
    async fn history(&self, actor: &ValidatedUser, order_id: Uuid) -> ServiceResult<Vec<OrderFlowEvent>>;

    async fn transition(
        &self,
        actor: &ValidatedUser,
        order_id: Uuid,
        action: FlowAction,
        request: FlowRequest,
    ) -> ServiceResult<Order>;
}

pub struct PgOrderFlowService {
    pool: PgPool,
}

impl PgOrderFlowService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub fn required_permission(action: FlowAction) -> Permission {
    match action {
        FlowAction::Assign | FlowAction::Cancel => Permission::OrdersManage,
        FlowAction::Start | FlowAction::Submit => Permission::OrdersProcess,
        FlowAction::Approve | FlowAction::Reject => Permission::OrdersReview,
    }
}

/// Target status for `action`, after checking the request carries what the action needs
pub fn plan_transition(current: OrderStatus, action: FlowAction, request: &FlowRequest) -> Result<OrderStatus, ServiceError> {
    let target = current.apply(action).ok_or_else(|| {
        ServiceError::Conflict(format!(
            "Cannot {} an order that is {}",
            action.as_str(),
            current.as_str()
        ))
    })?;

    match action {
        FlowAction::Assign if request.user_id.is_none() => {
            Err(ServiceError::invalid("user_id", "An assignee is required"))
        }
        FlowAction::Reject if request.reason.as_deref().map_or(true, |r| r.trim().is_empty()) => {
            Err(ServiceError::invalid("reason", "A reason is required to reject an order"))
        }
        _ => Ok(target),
    }
}

/// Required fields without a value
pub fn missing_required(values: &[OrderFieldValue]) -> Vec<ValidationError> {
    values
        .iter()
        .filter(|v| v.is_required && v.value.as_deref().map_or(true, |s| s.trim().is_empty()))
        .map(|v| ValidationError::new(v.field_name.as_str(), format!("{} is required", v.label)))
        .collect()
}

#[async_trait]
impl OrderFlowService for PgOrderFlowService {
    async fn history(&self, actor: &ValidatedUser, order_id: Uuid) -> ServiceResult<Vec<OrderFlowEvent>> {
        actor.require(Permission::OrdersRead)?;

        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, order_id, false).await?;

        let events = sqlx::query_as::<_, OrderFlowEvent>(
            "SELECT id, order_id, from_status, to_status, actor, note, created_at
             FROM order_flow_events WHERE order_id = $1
             ORDER BY created_at, id",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        ok(events)
    }

    async fn transition(
        &self,
        actor: &ValidatedUser,
        order_id: Uuid,
        action: FlowAction,
        request: FlowRequest,
    ) -> ServiceResult<Order> {
        actor.require(required_permission(action))?;

        let mut tx = self.pool.begin().await?;
        let order = load_order(&mut tx, order_id, true).await?;
        let target = plan_transition(order.status, action, &request)?;

        let mut assigned_to = order.assigned_to;
        match action {
            FlowAction::Assign => {
                let assignee = request.user_id.ok_or_else(|| ServiceError::invalid("user_id", "An assignee is required"))?;
                let active: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND is_active)")
                    .bind(assignee)
                    .fetch_one(&mut *tx)
                    .await?;
                if !active {
                    return Err(ServiceError::invalid("user_id", "Assignee does not exist or is not active"));
                }
                assigned_to = Some(assignee);
            }
            FlowAction::Submit => {
                let values = load_values(&mut tx, &order).await?;
                let missing = missing_required(&values);
                if !missing.is_empty() {
                    return Err(ServiceError::Invalid(missing));
                }
            }
            _ => {}
        }

        let note = match action {
            FlowAction::Reject => request.reason.as_deref().map(str::trim).map(str::to_string),
            _ => request.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        };

        let updated = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET status = $2, assigned_to = $3, updated_at = now() WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(target)
        .bind(assigned_to)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO order_flow_events (order_id, from_status, to_status, actor, note) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order_id)
        .bind(order.status)
        .bind(target)
        .bind(actor.id)
        .bind(&note)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "order",
            order_id,
            AuditAction::Transition,
            json!({
                "action": action.as_str(),
                "from": order.status.as_str(),
                "to": target.as_str(),
                "assigned_to": assigned_to,
                "note": note,
            }),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            "Order {} {} -> {} by {}",
            order_id,
            order.status.as_str(),
            target.as_str(),
            actor.id
        );
        ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::schema::FieldType;

    fn value(name: &str, required: bool, value: Option<&str>) -> OrderFieldValue {
        OrderFieldValue {
            schema_field_id: Uuid::new_v4(),
            field_name: name.into(),
            label: name.to_uppercase(),
            field_type: FieldType::Text,
            is_required: required,
            display_order: 1,
            value: value.map(str::to_string),
            updated_by: None,
            updated_at: None,
        }
    }

    #[test]
    fn permissions_follow_the_flow_table() {
        assert_eq!(required_permission(FlowAction::Assign), Permission::OrdersManage);
        assert_eq!(required_permission(FlowAction::Start), Permission::OrdersProcess);
        assert_eq!(required_permission(FlowAction::Submit), Permission::OrdersProcess);
        assert_eq!(required_permission(FlowAction::Approve), Permission::OrdersReview);
        assert_eq!(required_permission(FlowAction::Reject), Permission::OrdersReview);
        assert_eq!(required_permission(FlowAction::Cancel), Permission::OrdersManage);
    }

    #[test]
    fn illegal_transition_is_a_conflict() {
        let err = plan_transition(OrderStatus::New, FlowAction::Approve, &FlowRequest::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn assign_needs_a_user() {
        let err = plan_transition(OrderStatus::New, FlowAction::Assign, &FlowRequest::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));

        let request = FlowRequest {
            user_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert_eq!(
            plan_transition(OrderStatus::New, FlowAction::Assign, &request).unwrap(),
            OrderStatus::Assigned
        );
    }

    #[test]
    fn reject_needs_a_reason() {
        let blank = FlowRequest {
            reason: Some("  ".into()),
            ..Default::default()
        };
        assert!(plan_transition(OrderStatus::Submitted, FlowAction::Reject, &blank).is_err());

        let request = FlowRequest {
            reason: Some("Totals do not match".into()),
            ..Default::default()
        };
        assert_eq!(
            plan_transition(OrderStatus::Submitted, FlowAction::Reject, &request).unwrap(),
            OrderStatus::Rejected
        );
    }

    #[test]
    fn conflict_is_reported_before_missing_input() {
        let err = plan_transition(OrderStatus::Approved, FlowAction::Reject, &FlowRequest::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn submit_lists_missing_required_fields() {
        let values = vec![
            value("invoice_number", true, Some("INV-1")),
            value("total", true, None),
            value("vendor", true, Some(" ")),
            value("notes", false, None),
        ];

        let missing = missing_required(&values);
        let names: Vec<_> = missing.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(names, vec!["total", "vendor"]);
    }

    mod db {
        use std::collections::BTreeMap;

        use serde_json::json;
        use sqlx::PgPool;

        use super::super::*;
        use crate::services::order::CreateOrder;
        use crate::services::order_data::OrderValues;
        use crate::services::{OrderDataService, OrderService, PgOrderDataService, PgOrderService};
        use crate::testing::fixtures;

        fn assign_to(user: &ValidatedUser) -> FlowRequest {
            FlowRequest {
                user_id: Some(user.id),
                ..Default::default()
            }
        }

        #[sqlx::test(migrations = "./migrations/tenant")]
        async fn order_runs_from_assignment_to_approval(pool: PgPool) {
            let ws = fixtures::workspace(&pool).await;
            let operator = fixtures::user(&pool, "operator@acme.test", &["operator"]).await;
            let reviewer = fixtures::user(&pool, "reviewer@acme.test", &["reviewer"]).await;

            let order = PgOrderService::new(pool.clone())
                .create(
                    &ws.admin,
                    CreateOrder {
                        batch_id: ws.batch_id,
                        schema_id: ws.schema_id,
                        reference: "INV-0001".into(),
                        priority: 0,
                    },
                )
                .await
                .unwrap()
                .into_inner();
            assert_eq!(order.status, OrderStatus::New);

            let flow = PgOrderFlowService::new(pool.clone());
            flow.transition(&ws.admin, order.id, FlowAction::Assign, assign_to(&operator))
                .await
                .unwrap();
            flow.transition(&operator, order.id, FlowAction::Start, FlowRequest::default())
                .await
                .unwrap();

            let err = flow
                .transition(&operator, order.id, FlowAction::Submit, FlowRequest::default())
                .await
                .unwrap_err();
            let ServiceError::Invalid(missing) = err else {
                panic!("expected missing fields, got {:?}", err);
            };
            let names: Vec<_> = missing.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(names, vec!["invoice_number", "total"]);

            let values: BTreeMap<String, serde_json::Value> = [
                ("invoice_number".to_string(), json!("INV-0001")),
                ("total".to_string(), json!("1250.50")),
            ]
            .into_iter()
            .collect();
            PgOrderDataService::new(pool.clone())
                .update(&operator, order.id, OrderValues { values })
                .await
                .unwrap();

            let submitted = flow
                .transition(&operator, order.id, FlowAction::Submit, FlowRequest::default())
                .await
                .unwrap()
                .into_inner();
            assert_eq!(submitted.status, OrderStatus::Submitted);

            let err = flow
                .transition(&operator, order.id, FlowAction::Approve, FlowRequest::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Forbidden(_)));

            let approved = flow
                .transition(&reviewer, order.id, FlowAction::Approve, FlowRequest::default())
                .await
                .unwrap()
                .into_inner();
            assert_eq!(approved.status, OrderStatus::Approved);
            assert_eq!(approved.assigned_to, Some(operator.id));

            let err = flow
                .transition(&ws.admin, order.id, FlowAction::Cancel, FlowRequest::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Conflict(_)));

            // Refused transitions leave no trace
            let history = flow.history(&reviewer, order.id).await.unwrap().into_inner();
            let steps: Vec<_> = history.iter().map(|e| (e.from_status, e.to_status)).collect();
            assert_eq!(
                steps,
                vec![
                    (OrderStatus::New, OrderStatus::Assigned),
                    (OrderStatus::Assigned, OrderStatus::InProgress),
                    (OrderStatus::InProgress, OrderStatus::Submitted),
                    (OrderStatus::Submitted, OrderStatus::Approved),
                ]
            );

            let audited: i64 = sqlx::query_scalar(
                "SELECT count(*) FROM audit_logs WHERE entity = 'order' AND entity_id = $1 AND action = 'transition'",
            )
            .bind(order.id)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(audited, 4);
        }

        #[sqlx::test(migrations = "./migrations/tenant")]
        async fn assignee_must_be_an_active_user(pool: PgPool) {
            let ws = fixtures::workspace(&pool).await;
            let order = PgOrderService::new(pool.clone())
                .create(
                    &ws.admin,
                    CreateOrder {
                        batch_id: ws.batch_id,
                        schema_id: ws.schema_id,
                        reference: "INV-0002".into(),
                        priority: 0,
                    },
                )
                .await
                .unwrap()
                .into_inner();

            let request = FlowRequest {
                user_id: Some(Uuid::new_v4()),
                ..Default::default()
            };
            let err = PgOrderFlowService::new(pool.clone())
                .transition(&ws.admin, order.id, FlowAction::Assign, request)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Invalid(_)));
        }
    }
}
