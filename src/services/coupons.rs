use crate::{
    entities::coupon::{self, Entity as Coupon, Model as CouponModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::pricing_service::{CouponTerms, DiscountKind},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const MSG_CODE_REQUIRED: &str = "Coupon code is required";
pub const MSG_INVALID_CODE: &str = "Invalid coupon code";
pub const MSG_CORRUPTED: &str = "Coupon data is corrupted";
pub const MSG_LIMIT_REACHED: &str = "Coupon usage limit reached";
pub const MSG_EXPIRED: &str = "Coupon has expired";

/// Trims and upper-cases a coupon code; codes are stored in this form.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Administrative input for a new coupon
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
}

/// The coupon ledger: creation, lookup and exactly-once-per-slot redemption.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(&self, input: NewCoupon) -> Result<CouponModel, ServiceError> {
        let code = normalize_code(&input.code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(MSG_CODE_REQUIRED.into()));
        }
        let terms = CouponTerms::new(input.kind, input.value);
        terms.validate()?;
        if matches!(input.max_uses, Some(max) if max < 1) {
            return Err(ServiceError::ValidationError(
                "maxUses must be at least 1".into(),
            ));
        }

        let model = coupon::ActiveModel {
            code: Set(code.clone()),
            discount_type: Set(Some(terms.kind.as_str().to_string())),
            discount_value: Set(Some(terms.value)),
            expires_at: Set(input.expires_at),
            max_uses: Set(input.max_uses),
            used_count: Set(0),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&*self.db).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                ServiceError::Conflict(format!("Coupon {} already exists", code))
            } else {
                ServiceError::from(e)
            }
        })?;

        self.event_sender
            .send_or_log(Event::CouponCreated { code: code.clone() })
            .await;
        info!(coupon = %code, "Coupon created");
        Ok(created)
    }

    /// Checks that a coupon could be redeemed right now without consuming a use.
    pub async fn lookup(&self, code: &str) -> Result<CouponTerms, ServiceError> {
        let code = normalize_code(code);
        let model = self.load(&code).await?;
        Self::check_redeemable(&model, Utc::now())
    }

    /// Validates the coupon and consumes one use.
    ///
    /// The increment is a single conditional `UPDATE`, so two concurrent
    /// redemptions can never both take the last slot, and a coupon that
    /// expires after the read above is still refused.
    #[instrument(skip(self))]
    pub async fn redeem(&self, code: &str) -> Result<CouponTerms, ServiceError> {
        let code = normalize_code(code);
        let model = self.load(&code).await?;
        let terms = Self::check_redeemable(&model, Utc::now())?;

        let now = Utc::now();
        if self.take_slot(&code, now).await? == 0 {
            return Err(self.refusal(&code, now).await);
        }

        // Read back for reporting only; the guard above is what enforces the limit.
        let used_count = Coupon::find_by_id(code.clone())
            .one(&*self.db)
            .await?
            .map(|m| m.used_count)
            .unwrap_or(model.used_count + 1);

        self.event_sender
            .send_or_log(Event::CouponRedeemed {
                code: code.clone(),
                used_count,
                max_uses: model.max_uses,
            })
            .await;
        info!(coupon = %code, used_count, "Coupon redeemed");

        Ok(terms)
    }

    /// `used_count += 1` unless the coupon is exhausted or expired at `now`.
    /// Returns the number of rows touched.
    async fn take_slot(&self, code: &str, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .filter(coupon::Column::Code.eq(code))
            .filter(
                Condition::any()
                    .add(coupon::Column::MaxUses.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::MaxUses)),
                    ),
            )
            .filter(
                Condition::any()
                    .add(coupon::Column::ExpiresAt.is_null())
                    .add(coupon::Column::ExpiresAt.gt(now)),
            )
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Why a guarded redemption touched no row.
    async fn refusal(&self, code: &str, now: DateTime<Utc>) -> ServiceError {
        match self.load(code).await {
            Ok(model) if model.is_expired_at(now) => {
                warn!(coupon = %code, "Coupon expired before it could be redeemed");
                ServiceError::Expired(MSG_EXPIRED.into())
            }
            Ok(_) => {
                warn!(coupon = %code, "Lost the race for the last coupon slot");
                ServiceError::LimitReached(MSG_LIMIT_REACHED.into())
            }
            Err(e) => e,
        }
    }

    async fn load(&self, code: &str) -> Result<CouponModel, ServiceError> {
        if code.is_empty() {
            return Err(ServiceError::ValidationError(MSG_CODE_REQUIRED.into()));
        }
        Coupon::find_by_id(code.to_string())
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                debug!(coupon = %code, "Unknown coupon code");
                ServiceError::NotFound(MSG_INVALID_CODE.into())
            })
    }

    fn check_redeemable(
        model: &CouponModel,
        now: DateTime<Utc>,
    ) -> Result<CouponTerms, ServiceError> {
        let terms = terms_of(model)?;
        if model.is_expired_at(now) {
            return Err(ServiceError::Expired(MSG_EXPIRED.into()));
        }
        if model.is_exhausted() {
            return Err(ServiceError::LimitReached(MSG_LIMIT_REACHED.into()));
        }
        Ok(terms)
    }
}

/// Discount terms stored on a coupon row; missing or unreadable terms are corrupt.
pub fn terms_of(model: &CouponModel) -> Result<CouponTerms, ServiceError> {
    let corrupted = || ServiceError::CorruptRecord(MSG_CORRUPTED.into());
    let kind = model
        .discount_type
        .as_deref()
        .ok_or_else(corrupted)?
        .parse::<DiscountKind>()
        .map_err(|_| corrupted())?;
    let value = model.discount_value.ok_or_else(corrupted)?;
    Ok(CouponTerms::new(kind, value))
}
