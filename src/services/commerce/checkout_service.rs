use crate::{
    config::AppConfig,
    entities::order::{OrderStatus, PaymentMode},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::{cart_service::CartService, pricing_service::{compute_totals, OrderTotals}},
        coupons::{normalize_code, CouponService},
        orders::{
            AppliedCoupon, FollowUpReport, NewOrder, OrderService, OrderView, ShippingAddress,
        },
        payments::{GatewayOrder, GatewayOrderRequest, PaymentGateway},
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Checkout steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    AddressEntry,
    OrderReview,
    PaymentSelection,
    GatewayPending,
    Confirmed,
    Failed,
}

impl CheckoutStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutStep::Confirmed | CheckoutStep::Failed)
    }
}

/// One checkout attempt.
///
/// Prepaid: `AddressEntry → OrderReview → PaymentSelection → GatewayPending →
/// Confirmed | Failed`. Cash on delivery skips `GatewayPending`. A failed
/// attempt only leaves `Failed` through [`CheckoutFlow::restart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutFlow {
    step: CheckoutStep,
    address: Option<ShippingAddress>,
    payment_mode: Option<PaymentMode>,
}

impl Default for CheckoutFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutFlow {
    pub fn new() -> Self {
        Self {
            step: CheckoutStep::AddressEntry,
            address: None,
            payment_mode: None,
        }
    }

    /// Rebuilds the flow position of an already written order.
    pub fn for_order(order: &OrderView) -> Self {
        let step = match (order.status, order.payment_mode) {
            (OrderStatus::Paid, _) | (OrderStatus::Pending, PaymentMode::Cod) => {
                CheckoutStep::Confirmed
            }
            (OrderStatus::Pending, PaymentMode::Prepaid) => CheckoutStep::GatewayPending,
        };
        Self {
            step,
            address: Some(order.address.clone()),
            payment_mode: Some(order.payment_mode),
        }
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn address(&self) -> Option<&ShippingAddress> {
        self.address.as_ref()
    }

    pub fn payment_mode(&self) -> Option<PaymentMode> {
        self.payment_mode
    }

    fn illegal(&self, action: &str) -> ServiceError {
        ServiceError::InvalidOperation(format!(
            "Cannot {} while checkout is at {:?}",
            action, self.step
        ))
    }

    pub fn submit_address(&mut self, address: ShippingAddress) -> Result<(), ServiceError> {
        if self.step != CheckoutStep::AddressEntry {
            return Err(self.illegal("submit an address"));
        }
        address.validate()?;
        self.address = Some(address);
        self.step = CheckoutStep::OrderReview;
        Ok(())
    }

    pub fn confirm_review(&mut self) -> Result<(), ServiceError> {
        if self.step != CheckoutStep::OrderReview {
            return Err(self.illegal("confirm the review"));
        }
        self.step = CheckoutStep::PaymentSelection;
        Ok(())
    }

    /// One step back; only possible before payment starts.
    pub fn back(&mut self) -> Result<(), ServiceError> {
        self.step = match self.step {
            CheckoutStep::OrderReview => CheckoutStep::AddressEntry,
            CheckoutStep::PaymentSelection => {
                self.payment_mode = None;
                CheckoutStep::OrderReview
            }
            _ => return Err(self.illegal("go back")),
        };
        Ok(())
    }

    pub fn select_payment(&mut self, mode: PaymentMode) -> Result<(), ServiceError> {
        if self.step != CheckoutStep::PaymentSelection {
            return Err(self.illegal("select a payment mode"));
        }
        self.payment_mode = Some(mode);
        Ok(())
    }

    pub fn begin_gateway_payment(&mut self) -> Result<(), ServiceError> {
        if self.step != CheckoutStep::PaymentSelection
            || self.payment_mode != Some(PaymentMode::Prepaid)
        {
            return Err(self.illegal("start a gateway payment"));
        }
        self.step = CheckoutStep::GatewayPending;
        Ok(())
    }

    pub fn confirm(&mut self) -> Result<(), ServiceError> {
        match (self.step, self.payment_mode) {
            (CheckoutStep::PaymentSelection, Some(PaymentMode::Cod))
            | (CheckoutStep::GatewayPending, Some(PaymentMode::Prepaid)) => {
                self.step = CheckoutStep::Confirmed;
                Ok(())
            }
            _ => Err(self.illegal("confirm")),
        }
    }

    pub fn fail(&mut self) -> Result<(), ServiceError> {
        if self.step != CheckoutStep::GatewayPending {
            return Err(self.illegal("fail"));
        }
        self.step = CheckoutStep::Failed;
        Ok(())
    }

    pub fn restart(&mut self) -> Result<(), ServiceError> {
        if self.step != CheckoutStep::Failed {
            return Err(self.illegal("restart"));
        }
        *self = Self::new();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderInput {
    pub payment_mode: PaymentMode,
    pub address: ShippingAddress,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub checkout_id: String,
    pub payment_mode: PaymentMode,
    pub status: OrderStatus,
    pub step: CheckoutStep,
    pub totals: OrderTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order: Option<GatewayOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUpReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPaymentError {
    pub code: Option<String>,
    pub description: Option<String>,
}

/// What the gateway widget reported back to the browser
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentResult {
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    pub error: Option<GatewayPaymentError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub checkout_id: String,
    pub status: OrderStatus,
    pub step: CheckoutStep,
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUpReport>,
}

impl PaymentOutcome {
    fn current(order: &OrderView) -> Self {
        Self {
            checkout_id: order.id.clone(),
            status: order.status,
            step: CheckoutFlow::for_order(order).step(),
            created: false,
            follow_up: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub gateway_timeout: Duration,
    pub verify_signatures: bool,
}

impl From<&AppConfig> for CheckoutSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            currency: cfg.default_currency.clone(),
            gateway_timeout: cfg.payment_gateway_timeout(),
            verify_signatures: cfg.payment_verify_signatures,
        }
    }
}

/// Sequences coupon lookup, pricing, the gateway and the order writer.
#[derive(Clone)]
pub struct CheckoutService {
    carts: CartService,
    coupons: CouponService,
    orders: OrderService,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        carts: CartService,
        coupons: CouponService,
        orders: OrderService,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            carts,
            coupons,
            orders,
            gateway,
            event_sender,
            settings,
        }
    }

    /// Creates a bare gateway order for `amount` minor units.
    #[instrument(skip(self))]
    pub async fn create_gateway_order(&self, amount: i64) -> Result<GatewayOrder, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::ValidationError("Invalid amount".into()));
        }
        self.call_gateway(GatewayOrderRequest::new(amount, &self.settings.currency))
            .await
    }

    async fn call_gateway(&self, request: GatewayOrderRequest) -> Result<GatewayOrder, ServiceError> {
        match tokio::time::timeout(
            self.settings.gateway_timeout,
            self.gateway.create_order(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.settings.gateway_timeout, "Payment gateway timed out");
                Err(ServiceError::GatewayError(
                    "Payment gateway timed out".into(),
                ))
            }
        }
    }

    /// Prices the caller's cart and writes the order.
    ///
    /// Cash on delivery is written `pending` and confirmed at once, with the
    /// cart and inventory follow-ups run here. Prepaid orders are keyed by the
    /// gateway order id and wait for the payment result.
    #[instrument(skip(self, input), fields(payment_mode = ?input.payment_mode))]
    pub async fn place_order(
        &self,
        user_id: &str,
        input: PlaceOrderInput,
    ) -> Result<PlacedOrder, ServiceError> {
        let mut flow = CheckoutFlow::new();
        flow.submit_address(input.address)?;
        flow.confirm_review()?;
        flow.select_payment(input.payment_mode)?;

        let lines = self.carts.priced_lines(user_id).await?;
        let coupon = match input.coupon_code.as_deref().map(normalize_code) {
            Some(code) if !code.is_empty() => {
                let terms = self.coupons.lookup(&code).await?;
                Some(AppliedCoupon { code, terms })
            }
            _ => None,
        };
        let totals = compute_totals(
            &lines,
            coupon.as_ref().map(|c| &c.terms),
            &self.settings.currency,
        )?;

        let address = flow
            .address()
            .cloned()
            .ok_or_else(|| ServiceError::InternalError("Checkout lost its address".into()))?;

        // Placement is the single redemption point. A use taken here is not
        // returned if the order write or the gateway call fails afterwards.
        if let Some(applied) = &coupon {
            self.coupons.redeem(&applied.code).await?;
        }

        match input.payment_mode {
            PaymentMode::Cod => {
                let new_order = NewOrder {
                    checkout_id: format!("cod_{}", Uuid::new_v4().simple()),
                    user_id: user_id.to_string(),
                    payment_mode: PaymentMode::Cod,
                    address,
                    coupon,
                    lines,
                    totals: totals.clone(),
                    gateway_order_id: None,
                };
                let order = self.orders.write_pending(&new_order).await?;
                flow.confirm()?;
                let follow_up = self.orders.run_follow_ups(&order).await;
                info!(checkout_id = %order.id, "Cash-on-delivery order placed");

                Ok(PlacedOrder {
                    checkout_id: order.id,
                    payment_mode: PaymentMode::Cod,
                    status: order.status,
                    step: flow.step(),
                    totals,
                    gateway_order: None,
                    follow_up: Some(follow_up),
                })
            }
            PaymentMode::Prepaid => {
                flow.begin_gateway_payment()?;
                let gateway_order = self
                    .call_gateway(GatewayOrderRequest::new(
                        totals.amount_minor,
                        &totals.currency,
                    ))
                    .await?;

                let new_order = NewOrder {
                    checkout_id: gateway_order.id.clone(),
                    user_id: user_id.to_string(),
                    payment_mode: PaymentMode::Prepaid,
                    address,
                    coupon,
                    lines,
                    totals: totals.clone(),
                    gateway_order_id: Some(gateway_order.id.clone()),
                };
                let order = self.orders.write_pending(&new_order).await?;

                self.event_sender
                    .send_or_log(Event::CheckoutStarted {
                        checkout_id: order.id.clone(),
                        user_id: user_id.to_string(),
                        amount_minor: totals.amount_minor,
                    })
                    .await;

                Ok(PlacedOrder {
                    checkout_id: order.id,
                    payment_mode: PaymentMode::Prepaid,
                    status: order.status,
                    step: flow.step(),
                    totals,
                    gateway_order: Some(gateway_order),
                    follow_up: None,
                })
            }
        }
    }

    /// Applies the gateway widget's result to a prepaid checkout.
    #[instrument(skip(self, result))]
    pub async fn handle_payment_result(
        &self,
        user_id: &str,
        checkout_id: &str,
        result: PaymentResult,
    ) -> Result<PaymentOutcome, ServiceError> {
        let order = self.orders.get_order(user_id, checkout_id).await?;
        if order.payment_mode != PaymentMode::Prepaid {
            return Err(ServiceError::InvalidOperation(
                "Only prepaid checkouts take a payment result".into(),
            ));
        }
        if order.is_paid() {
            return Ok(PaymentOutcome::current(&order));
        }

        let mut flow = CheckoutFlow::for_order(&order);

        if let Some(err) = result.error {
            let reason = err
                .description
                .or(err.code)
                .unwrap_or_else(|| "Payment failed".to_string());
            return Err(self.payment_failed(&mut flow, checkout_id, reason).await);
        }

        let Some(payment_id) = result
            .razorpay_payment_id
            .filter(|id| !id.trim().is_empty())
        else {
            return Ok(PaymentOutcome::current(&order));
        };

        if self.settings.verify_signatures {
            let signature = result.razorpay_signature.as_deref().unwrap_or_default();
            let gateway_order_id = order.gateway_order_id.as_deref().unwrap_or(checkout_id);
            if let Err(e) = self
                .gateway
                .verify_payment(gateway_order_id, &payment_id, signature)
            {
                return Err(self
                    .payment_failed(&mut flow, checkout_id, e.to_string())
                    .await);
            }
        }

        self.orders
            .record_payment(checkout_id, &payment_id, result.razorpay_signature.as_deref())
            .await?;
        let outcome = self.orders.finalize(checkout_id, None).await?;
        flow.confirm()?;

        Ok(PaymentOutcome {
            checkout_id: outcome.order.id,
            status: outcome.order.status,
            step: flow.step(),
            created: outcome.created,
            follow_up: Some(outcome.follow_up),
        })
    }

    /// Success-page check: finalizes a prepaid order whose payment was
    /// recorded but not yet applied, otherwise reports where it stands.
    #[instrument(skip(self))]
    pub async fn confirm_success(
        &self,
        user_id: &str,
        checkout_id: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        let order = self.orders.get_order(user_id, checkout_id).await?;
        let awaiting_finalize = !order.is_paid()
            && order.payment_mode == PaymentMode::Prepaid
            && order.gateway_payment_id.is_some();
        if !awaiting_finalize {
            return Ok(PaymentOutcome::current(&order));
        }

        let outcome = self.orders.finalize(checkout_id, None).await?;
        let step = CheckoutFlow::for_order(&outcome.order).step();
        Ok(PaymentOutcome {
            checkout_id: outcome.order.id,
            status: outcome.order.status,
            step,
            created: outcome.created,
            follow_up: Some(outcome.follow_up),
        })
    }

    async fn payment_failed(
        &self,
        flow: &mut CheckoutFlow,
        checkout_id: &str,
        reason: String,
    ) -> ServiceError {
        if let Err(e) = flow.fail() {
            warn!(%checkout_id, error = %e, "Payment failure outside the gateway step");
        }
        warn!(%checkout_id, %reason, "Payment failed");
        self.event_sender
            .send_or_log(Event::PaymentFailed {
                checkout_id: checkout_id.to_string(),
                reason: reason.clone(),
            })
            .await;
        ServiceError::GatewayError(reason)
    }
}
