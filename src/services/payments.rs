//! Tenders against an order and gateway settlement.
//!
//! `order.paid_total` only ever moves under a lock on the order row, and a
//! gateway payment flips to paid through a conditional update guarded by
//! `is_paid = false`. Together they keep `paid_total` equal to the sum of
//! settled payments no matter how callbacks and cash tenders interleave.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    db::{self, audit::Audited, DbPool, WriteContext},
    entities::{
        gateway_account, gateway_log,
        order::{self, OrderStatus},
        order_payment::{self, PaymentStatus},
        payment_method::{self, Issuer},
        user_payment_method,
    },
    errors::ServiceError,
    services::{
        gateway::{
            CallbackPayload, CallbackStatus, GatewayError, GatewayRegistry, TransactionRequest,
        },
        orders::load_order,
        tenancy::TenantScope,
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub payment_method_id: i32,
    pub amount: Decimal,
    #[validate(length(max = 120))]
    pub customer_name: Option<String>,
    #[validate(length(max = 32))]
    pub customer_phone: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterGatewayAccountRequest {
    #[validate(length(min = 1, max = 120))]
    pub external_account_id: String,
    #[validate(length(max = 64))]
    pub virtual_account: Option<String>,
}

/// A global payment method with the caller's activation state.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodView {
    #[serde(flatten)]
    pub method: payment_method::Model,
    pub activated: bool,
    pub registration_required: bool,
}

/// What a callback did to its payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Applied,
    /// Paid after the order had already closed; the amount went to change.
    AppliedAsChange,
    Failed,
    Unchanged,
}

/// Return/cancel/notify URLs handed to issuers.
#[derive(Debug, Clone, Default)]
pub struct PaymentUrls {
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    /// Public base the issuer calls back on; the issuer path is appended.
    pub notify_base: Option<String>,
}

impl PaymentUrls {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            return_url: config.payment_return_url.clone(),
            cancel_url: config.payment_cancel_url.clone(),
            notify_base: config.payment_notify_url.clone(),
        }
    }

    fn notify_url(&self, issuer: Issuer) -> Option<String> {
        self.notify_base.as_ref().map(|base| {
            format!("{}/api/payment/{}/notify", base.trim_end_matches('/'), issuer)
        })
    }
}

/// Splits a tender into the part applied to the order and the change.
pub fn split_tender(amount: Decimal, remaining: Decimal) -> (Decimal, Decimal) {
    let remaining = remaining.max(Decimal::ZERO);
    if amount > remaining {
        (remaining, amount - remaining)
    } else {
        (amount, Decimal::ZERO)
    }
}

fn registration_required(issuer: Issuer) -> ServiceError {
    match issuer {
        Issuer::Tsm => ServiceError::TsmRegistrationRequired,
        _ => ServiceError::IpaymuRegistrationRequired,
    }
}

#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    gateways: Arc<GatewayRegistry>,
    urls: PaymentUrls,
}

impl PaymentService {
    pub fn new(db_pool: Arc<DbPool>, gateways: Arc<GatewayRegistry>, urls: PaymentUrls) -> Self {
        Self {
            db_pool,
            gateways,
            urls,
        }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    /// Records a tender. Cash settles immediately; gateway tenders stay
    /// pending until the issuer calls back.
    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id, order = %request.order_id))]
    pub async fn create_payment(
        &self,
        scope: &TenantScope,
        request: CreatePaymentRequest,
    ) -> Result<order_payment::Model, ServiceError> {
        request.validate()?;
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "payment amount must be greater than zero".into(),
            ));
        }

        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();

        let order = load_order(db, scope, request.order_id).await?;
        ensure_open(&order)?;

        let method = self
            .activated_method(scope, request.payment_method_id)
            .await?;
        let account = if method.is_cash() {
            None
        } else {
            Some(self.gateway_account(scope.owner_id, method.issuer()).await?)
        };

        let txn = db::begin(db).await?;
        let order = lock_order(&txn, order.id).await?;
        ensure_open(&order)?;
        let (effective, change) = split_tender(request.amount, order.remaining());

        let mut payment = order_payment::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner_id: Set(scope.owner_id),
            order_id: Set(order.id),
            payment_method_id: Set(method.id),
            amount_paid: Set(effective),
            change_amount: Set(change),
            customer_name: Set(request.customer_name.clone()),
            customer_phone: Set(request.customer_phone.clone()),
            customer_email: Set(request.customer_email.clone()),
            ..Default::default()
        };
        payment.stamp_created(&ctx);

        match account {
            None => {
                let payment_uuid = Uuid::new_v4();
                payment.uuid = Set(payment_uuid);
                payment.reference_id = Set(payment_uuid.to_string());
                payment.is_paid = Set(true);
                payment.paid_at = Set(Some(Utc::now()));
                payment.status = Set(PaymentStatus::Paid.to_string());
                let payment = payment.insert(&txn).await?;

                apply_to_order(&txn, &ctx, order, effective).await?;
                db::commit(txn).await?;

                counter!("kasir_payments.cash", 1);
                info!(payment = %payment.uuid, %effective, %change, "cash payment recorded");
                Ok(payment)
            }
            Some(account) => {
                let payment_uuid = Uuid::new_v4();
                payment.uuid = Set(payment_uuid);
                payment.reference_id = Set(payment_uuid.to_string());
                payment.is_paid = Set(false);
                payment.status = Set(PaymentStatus::Pending.to_string());
                let payment = payment.insert(&txn).await?;

                self.place_with_gateway(txn, &ctx, &method, &account, payment, &request)
                    .await
            }
        }
    }

    async fn place_with_gateway(
        &self,
        txn: DatabaseTransaction,
        ctx: &WriteContext,
        method: &payment_method::Model,
        account: &gateway_account::Model,
        payment: order_payment::Model,
        request: &CreatePaymentRequest,
    ) -> Result<order_payment::Model, ServiceError> {
        let issuer = method.issuer();
        let adapter = self.gateways.get(issuer)?;

        let trx_request = TransactionRequest {
            reference_id: payment.reference_id.clone(),
            amount: payment.amount_paid,
            payment_method: method.code.clone(),
            payment_channel: method.channel.clone(),
            account: account.external_account_id.clone(),
            name: request.customer_name.clone(),
            phone: request.customer_phone.clone(),
            email: request.customer_email.clone(),
            return_url: self.urls.return_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            notify_url: self.urls.notify_url(issuer),
        };

        let mut log = gateway_log::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            issuer: Set(issuer.to_string()),
            service_name: Set(adapter.service_name().to_string()),
            reference: Set(payment.reference_id.clone()),
            amount: Set(payment.amount_paid),
            method: Set(method.code.clone()),
            channel: Set(method.channel.clone()),
            request_at: Set(Utc::now()),
            success_at: Set(None),
            settlement_at: Set(None),
            ..Default::default()
        };

        match adapter.create_transaction(&trx_request).await {
            Ok(trx) => {
                log.response_status = Set(Some(200));
                log.insert(&txn).await?;

                let mut active: order_payment::ActiveModel = payment.into();
                active.gateway_reference = Set(Some(trx.transaction_id));
                active.payment_url = Set(trx.payment_url);
                active.extra = Set(Some(trx.raw));
                active.stamp_updated(ctx);
                let payment = active.update(&txn).await?;

                db::commit(txn).await?;
                counter!("kasir_payments.gateway_placed", 1);
                info!(payment = %payment.uuid, issuer = %issuer, "gateway payment pending");
                Ok(payment)
            }
            Err(err) => {
                txn.rollback().await?;
                log.response_status = Set(match &err {
                    GatewayError::Rejected { status, .. } => {
                        i32::try_from(*status).ok()
                    }
                    _ => None,
                });
                if let Err(log_err) = log.insert(self.db_pool.as_ref()).await {
                    warn!(error = %log_err, "failed to record gateway audit row");
                }
                counter!("kasir_payments.gateway_failed", 1);
                warn!(error = %err, issuer = %issuer, "gateway refused transaction");
                Err(err.into())
            }
        }
    }

    async fn activated_method(
        &self,
        scope: &TenantScope,
        method_id: i32,
    ) -> Result<payment_method::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let method = payment_method::Entity::find_by_id(method_id)
            .filter(payment_method::Column::DeletedAt.is_null())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("payment method", method_id))?;
        if !method.is_active {
            return Err(ServiceError::PaymentMethodInactive(method_id));
        }

        let activated = user_payment_method::Entity::find()
            .filter(user_payment_method::Column::OwnerId.eq(scope.owner_id))
            .filter(user_payment_method::Column::PaymentMethodId.eq(method_id))
            .filter(user_payment_method::Column::IsActive.eq(true))
            .filter(user_payment_method::Column::DeletedAt.is_null())
            .one(db)
            .await?
            .is_some();
        if !activated {
            return Err(ServiceError::PaymentMethodInactive(method_id));
        }
        Ok(method)
    }

    async fn gateway_account(
        &self,
        owner_id: i32,
        issuer: Issuer,
    ) -> Result<gateway_account::Model, ServiceError> {
        gateway_account::Entity::find()
            .filter(gateway_account::Column::OwnerId.eq(owner_id))
            .filter(gateway_account::Column::Issuer.eq(issuer.to_string()))
            .filter(gateway_account::Column::DeletedAt.is_null())
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| registration_required(issuer))
    }

    /// Applies an issuer callback. Replays and late callbacks are no-ops.
    #[instrument(skip(self, payload), fields(issuer = %issuer, reference = %payload.reference_id))]
    pub async fn settle_callback(
        &self,
        issuer: Issuer,
        payload: CallbackPayload,
    ) -> Result<SettlementOutcome, ServiceError> {
        payload.validate()?;
        let db = self.db_pool.as_ref();
        let ctx = WriteContext::system();
        let txn = db::begin(db).await?;

        let payment = db::for_update(
            order_payment::Entity::find()
                .filter(order_payment::Column::ReferenceId.eq(payload.reference_id.as_str()))
                .filter(order_payment::Column::DeletedAt.is_null()),
            &txn,
        )
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::UnknownReference(payload.reference_id.clone()))?;

        let method = payment_method::Entity::find_by_id(payment.payment_method_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::UnknownReference(payload.reference_id.clone()))?;
        if method.issuer() != issuer {
            return Err(ServiceError::UnknownReference(payload.reference_id));
        }

        if payment.is_paid || !payment.has_status(PaymentStatus::Pending) {
            info!(payment = %payment.uuid, "callback for settled payment ignored");
            return Ok(SettlementOutcome::Unchanged);
        }

        let outcome = match payload.status {
            CallbackStatus::Pending => SettlementOutcome::Unchanged,
            CallbackStatus::Failed => {
                let updated = transition_pending(&txn, payment.id, PaymentStatus::Failed).await?;
                if updated {
                    counter!("kasir_payments.gateway_failed", 1);
                    SettlementOutcome::Failed
                } else {
                    SettlementOutcome::Unchanged
                }
            }
            CallbackStatus::Paid => {
                if !transition_pending(&txn, payment.id, PaymentStatus::Paid).await? {
                    SettlementOutcome::Unchanged
                } else {
                    self.settle_paid(&txn, &ctx, payment, &payload).await?
                }
            }
        };

        db::commit(txn).await?;
        info!(?outcome, "gateway callback processed");
        Ok(outcome)
    }

    async fn settle_paid(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        payment: order_payment::Model,
        payload: &CallbackPayload,
    ) -> Result<SettlementOutcome, ServiceError> {
        let now = Utc::now();
        let order = lock_order(txn, payment.order_id).await?;
        let requested = payment.amount_paid;

        let (applied, outcome) = if order.has_status(OrderStatus::Pending) {
            (
                requested.min(order.remaining()),
                SettlementOutcome::Applied,
            )
        } else {
            warn!(order = %order.uuid, status = %order.status, "payment settled on a closed order");
            (Decimal::ZERO, SettlementOutcome::AppliedAsChange)
        };

        let mut active: order_payment::ActiveModel = payment.clone().into();
        active.paid_at = Set(Some(now));
        if applied != requested {
            active.amount_paid = Set(applied);
            active.change_amount = Set(payment.change_amount + (requested - applied));
        }
        if let Some(trx_id) = &payload.trx_id {
            active.gateway_reference = Set(Some(trx_id.clone()));
        }
        active.stamp_updated(ctx);
        active.update(txn).await?;

        if outcome == SettlementOutcome::Applied {
            apply_to_order(txn, ctx, order, applied).await?;
        }

        let settled = payload
            .settlement_status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("settled"))
            .unwrap_or(false);
        let mut log_update = gateway_log::Entity::update_many()
            .col_expr(gateway_log::Column::SuccessAt, Expr::value(Some(now)));
        if settled {
            log_update = log_update.col_expr(gateway_log::Column::SettlementAt, Expr::value(Some(now)));
        }
        log_update
            .filter(gateway_log::Column::Reference.eq(payment.reference_id.as_str()))
            .exec(txn)
            .await?;

        counter!("kasir_payments.gateway_settled", 1);
        Ok(outcome)
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn list_order_payments(
        &self,
        scope: &TenantScope,
        order_uuid: Uuid,
    ) -> Result<Vec<order_payment::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = load_order(db, scope, order_uuid).await?;
        Ok(order_payment::Entity::find()
            .filter(order_payment::Column::OrderId.eq(order.id))
            .filter(order_payment::Column::OwnerId.eq(scope.owner_id))
            .filter(order_payment::Column::DeletedAt.is_null())
            .order_by_asc(order_payment::Column::Id)
            .all(db)
            .await?)
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn list_payment_methods(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<PaymentMethodView>, ServiceError> {
        let db = self.db_pool.as_ref();
        let methods = payment_method::Entity::find()
            .filter(payment_method::Column::DeletedAt.is_null())
            .order_by_asc(payment_method::Column::Id)
            .all(db)
            .await?;
        let activations = user_payment_method::Entity::find()
            .filter(user_payment_method::Column::OwnerId.eq(scope.owner_id))
            .filter(user_payment_method::Column::IsActive.eq(true))
            .filter(user_payment_method::Column::DeletedAt.is_null())
            .all(db)
            .await?;
        let accounts = gateway_account::Entity::find()
            .filter(gateway_account::Column::OwnerId.eq(scope.owner_id))
            .filter(gateway_account::Column::DeletedAt.is_null())
            .all(db)
            .await?;

        Ok(methods
            .into_iter()
            .map(|method| {
                let activated = activations
                    .iter()
                    .any(|a| a.payment_method_id == method.id);
                let registration_required = !method.is_cash()
                    && !accounts
                        .iter()
                        .any(|a| a.issuer == method.issuer().to_string());
                PaymentMethodView {
                    method,
                    activated,
                    registration_required,
                }
            })
            .collect())
    }

    /// Turns a method on for the owner. Gateway methods need the issuer
    /// registration first.
    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn activate_payment_method(
        &self,
        scope: &TenantScope,
        method_id: i32,
    ) -> Result<user_payment_method::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let method = payment_method::Entity::find_by_id(method_id)
            .filter(payment_method::Column::DeletedAt.is_null())
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("payment method", method_id))?;
        if !method.is_active {
            return Err(ServiceError::PaymentMethodInactive(method_id));
        }
        if !method.is_cash() {
            self.gateway_account(scope.owner_id, method.issuer()).await?;
        }
        activate_for_owner(db, &scope.write_context(), scope.owner_id, method_id).await
    }

    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id, issuer = %issuer))]
    pub async fn register_gateway_account(
        &self,
        scope: &TenantScope,
        issuer: Issuer,
        request: RegisterGatewayAccountRequest,
    ) -> Result<gateway_account::Model, ServiceError> {
        request.validate()?;
        if issuer == Issuer::None {
            return Err(ServiceError::InvalidInput("unknown payment issuer".into()));
        }
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();

        let existing = gateway_account::Entity::find()
            .filter(gateway_account::Column::OwnerId.eq(scope.owner_id))
            .filter(gateway_account::Column::Issuer.eq(issuer.to_string()))
            .one(db)
            .await?;

        let account = match existing {
            Some(account) => {
                let mut active: gateway_account::ActiveModel = account.into();
                active.external_account_id = Set(request.external_account_id);
                active.virtual_account = Set(request.virtual_account);
                active.deleted_at = Set(None);
                active.deleted_by = Set(None);
                active.stamp_updated(&ctx);
                active.update(db).await?
            }
            None => {
                let mut active = gateway_account::ActiveModel {
                    uuid: Set(Uuid::new_v4()),
                    owner_id: Set(scope.owner_id),
                    issuer: Set(issuer.to_string()),
                    external_account_id: Set(request.external_account_id),
                    virtual_account: Set(request.virtual_account),
                    ..Default::default()
                };
                active.stamp_created(&ctx);
                active.insert(db).await?
            }
        };
        info!(account = %account.uuid, "gateway account registered");
        Ok(account)
    }
}

/// Upserts the owner's activation row for a method.
pub async fn activate_for_owner<C: sea_orm::ConnectionTrait>(
    conn: &C,
    ctx: &WriteContext,
    owner_id: i32,
    method_id: i32,
) -> Result<user_payment_method::Model, ServiceError> {
    let existing = user_payment_method::Entity::find()
        .filter(user_payment_method::Column::OwnerId.eq(owner_id))
        .filter(user_payment_method::Column::PaymentMethodId.eq(method_id))
        .one(conn)
        .await?;

    Ok(match existing {
        Some(row) if row.is_active && row.deleted_at.is_none() => row,
        Some(row) => {
            let mut active: user_payment_method::ActiveModel = row.into();
            active.is_active = Set(true);
            active.deleted_at = Set(None);
            active.deleted_by = Set(None);
            active.stamp_updated(ctx);
            active.update(conn).await?
        }
        None => {
            let mut active = user_payment_method::ActiveModel {
                uuid: Set(Uuid::new_v4()),
                owner_id: Set(owner_id),
                payment_method_id: Set(method_id),
                is_active: Set(true),
                ..Default::default()
            };
            active.stamp_created(ctx);
            active.insert(conn).await?
        }
    })
}

/// Catalogue of tenders every deployment starts with: code, name, channel, issuer.
pub const DEFAULT_PAYMENT_METHODS: &[(&str, &str, &str, Issuer)] = &[
    (payment_method::CASH_CODE, "Cash", "cash", Issuer::None),
    ("ipaymu_va", "iPaymu Virtual Account", "va", Issuer::Ipaymu),
    ("ipaymu_qris", "iPaymu QRIS", "qris", Issuer::Ipaymu),
    ("tsm_qris", "TSM QRIS", "qris", Issuer::Tsm),
];

/// Inserts any missing entry of [`DEFAULT_PAYMENT_METHODS`]. Returns how
/// many rows were created.
pub async fn seed_payment_methods<C: sea_orm::ConnectionTrait>(
    conn: &C,
) -> Result<usize, ServiceError> {
    let mut created = 0;
    for (code, name, channel, issuer) in DEFAULT_PAYMENT_METHODS {
        let exists = payment_method::Entity::find()
            .filter(payment_method::Column::Code.eq(*code))
            .one(conn)
            .await?
            .is_some();
        if exists {
            continue;
        }
        let now = Utc::now();
        payment_method::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            code: Set((*code).to_string()),
            name: Set((*name).to_string()),
            channel: Set((*channel).to_string()),
            issuer: Set(issuer.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        created += 1;
    }
    Ok(created)
}

fn ensure_open(order: &order::Model) -> Result<(), ServiceError> {
    if order.has_status(OrderStatus::Completed) {
        return Err(ServiceError::OrderAlreadyCompleted(order.uuid));
    }
    if order.has_status(OrderStatus::Cancelled) {
        return Err(ServiceError::Conflict(format!(
            "order {} is cancelled",
            order.uuid
        )));
    }
    Ok(())
}

async fn lock_order(txn: &DatabaseTransaction, order_id: i32) -> Result<order::Model, ServiceError> {
    db::for_update(order::Entity::find_by_id(order_id), txn)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("order", order_id))
}

/// Adds a settled amount to a locked order and completes it when covered.
async fn apply_to_order(
    txn: &DatabaseTransaction,
    ctx: &WriteContext,
    order: order::Model,
    amount: Decimal,
) -> Result<order::Model, ServiceError> {
    let paid_total = order.paid_total + amount;
    let completes = paid_total >= order.total;
    let uuid = order.uuid;

    let mut active: order::ActiveModel = order.into();
    active.paid_total = Set(paid_total);
    if completes {
        active.status = Set(OrderStatus::Completed.to_string());
        active.completed_at = Set(Some(Utc::now()));
    }
    active.stamp_updated(ctx);
    let order = active.update(txn).await?;

    if completes {
        counter!("kasir_orders.completed", 1);
        info!(order = %uuid, "order fully paid");
    }
    Ok(order)
}

/// Moves a pending, unpaid payment to `status`. False when another
/// delivery got there first.
async fn transition_pending(
    txn: &DatabaseTransaction,
    payment_id: i32,
    status: PaymentStatus,
) -> Result<bool, ServiceError> {
    let result = order_payment::Entity::update_many()
        .col_expr(order_payment::Column::Status, Expr::value(status.to_string()))
        .col_expr(
            order_payment::Column::IsPaid,
            Expr::value(status == PaymentStatus::Paid),
        )
        .col_expr(order_payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order_payment::Column::Id.eq(payment_id))
        .filter(order_payment::Column::IsPaid.eq(false))
        .filter(order_payment::Column::Status.eq(PaymentStatus::Pending.to_string()))
        .exec(txn)
        .await?;
    Ok(result.rows_affected == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn overpayment_returns_change() {
        assert_eq!(split_tender(dec!(20000), dec!(17500)), (dec!(17500), dec!(2500)));
    }

    #[test]
    fn partial_payment_has_no_change() {
        assert_eq!(split_tender(dec!(5000), dec!(17500)), (dec!(5000), dec!(0)));
        assert_eq!(split_tender(dec!(17500), dec!(17500)), (dec!(17500), dec!(0)));
    }

    #[test]
    fn negative_remaining_is_treated_as_settled() {
        assert_eq!(split_tender(dec!(100), dec!(-5)), (dec!(0), dec!(100)));
    }

    #[test]
    fn notify_url_is_issuer_specific() {
        let urls = PaymentUrls {
            notify_base: Some("https://pos.example/".into()),
            ..Default::default()
        };
        assert_eq!(
            urls.notify_url(Issuer::Ipaymu).as_deref(),
            Some("https://pos.example/api/payment/ipaymu/notify")
        );
        assert_eq!(PaymentUrls::default().notify_url(Issuer::Tsm), None);
    }

    #[test]
    fn registration_error_follows_issuer() {
        assert!(matches!(
            registration_required(Issuer::Tsm),
            ServiceError::TsmRegistrationRequired
        ));
        assert!(matches!(
            registration_required(Issuer::Ipaymu),
            ServiceError::IpaymuRegistrationRequired
        ));
    }
}
