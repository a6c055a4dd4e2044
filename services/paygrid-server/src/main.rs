//! PayGrid Server - Pay-per-query agent marketplace server
//!
//! Single binary combining the settlement pipeline, the seller policy gate,
//! and the cross-ledger treasury loop:
//! - Protected resources with payment-required challenges
//! - Buyer task settlement (escrow lock, execute, release on acceptance)
//! - Background facility rebalancing plus an on-demand trigger
//!
//! # Quick Start
//!
//! ```bash
//! # Start with defaults (localhost:8080)
//! paygrid-server
//!
//! # Custom port and rebalance cadence
//! paygrid-server --port 9090 --rebalance-interval-secs 60
//! ```

mod payment;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygrid_escrow::EscrowEngine;
use paygrid_ledger::{
    AgentRegistry, ChainAccount, CustodialWallet, FileStore, HttpCustodialWallet,
    MemoryAgentRegistry, MemoryChainAccount, MemoryCustodialWallet, MemoryEscrowLedger,
    MemoryPaymentFacility, PollConfig, WalletProviderConfig,
};
use paygrid_policy::{MemoryPolicyStore, SellerPolicyGate};
use paygrid_settlement::{TaskExecutor, TaskSettlementCoordinator};
use paygrid_treasury::{CrossLedgerRebalancer, RebalanceConfig};
use paygrid_types::{AgentId, ChainAddress, EscrowId, PayGridError};

use payment::{
    AcceptAllVerifier, PaymentChallenge, PaymentRequirements, PaymentVerifier, PAYMENT_HEADER,
};

/// PayGrid Server - pay-per-query agent marketplace
#[derive(Parser, Debug)]
#[command(
    name = "paygrid-server",
    about = "PayGrid - escrow settlement and cross-ledger treasury for agent marketplaces",
    version
)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "PAYGRID_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "PAYGRID_PORT")]
    port: u16,

    /// Seconds between scheduled rebalance checks
    #[arg(long, default_value = "300", env = "PAYGRID_REBALANCE_INTERVAL_SECS")]
    rebalance_interval_secs: u64,

    /// Facility balance below this triggers a refill
    #[arg(long, default_value = "5", env = "PAYGRID_LOW_BALANCE_THRESHOLD")]
    low_balance_threshold: Decimal,

    /// Target amount to move per rebalance cycle
    #[arg(long, default_value = "20", env = "PAYGRID_REFILL_AMOUNT")]
    refill_amount: Decimal,

    /// Transfers below this are not worth a transaction
    #[arg(long, default_value = "1", env = "PAYGRID_MINIMUM_VIABLE_AMOUNT")]
    minimum_viable_amount: Decimal,

    /// Initial custodial balance for the in-memory backend
    #[arg(long, default_value = "100", env = "PAYGRID_CUSTODIAL_BALANCE")]
    custodial_balance: Decimal,

    /// Custodial wallet backend: "memory" or "http" (wallet provider API)
    #[arg(long, default_value = "memory", env = "PAYGRID_WALLET_BACKEND")]
    wallet_backend: String,

    /// Directory for persisted operational records (wallet descriptor)
    #[arg(long, default_value = ".paygrid", env = "PAYGRID_DATA_DIR")]
    data_dir: String,
}

/// Shared application state
struct AppState {
    engine: Arc<EscrowEngine>,
    coordinator: TaskSettlementCoordinator,
    gate: SellerPolicyGate,
    rebalancer: Arc<CrossLedgerRebalancer>,
    registry: Arc<MemoryAgentRegistry>,
    policy_store: Arc<MemoryPolicyStore>,
    verifier: Arc<dyn PaymentVerifier>,
    /// Agent this server sells as; protected routes are gated on it
    resident_agent: AgentId,
    oracle_requirements: PaymentRequirements,
}

/// Placeholder execution collaborator; the real response-generation engine
/// is external to this core.
struct EchoExecutor;

#[async_trait::async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, query: &str) -> Result<String, String> {
        Ok(format!("echo: {query}"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state = bootstrap(&args).await?;

    // Background treasury loop; shares the single-flight guard with the
    // manual trigger endpoint.
    state
        .rebalancer
        .clone()
        .spawn_interval(Duration::from_secs(args.rebalance_interval_secs));

    let app = Router::new()
        .route("/api/health", get(api_health))
        // Settlement pipeline
        .route("/api/task", post(api_process_task))
        .route("/api/task/:escrow_id/accept", post(api_accept_task))
        .route("/api/escrow/:escrow_id", get(api_get_escrow))
        // Marketplace
        .route("/api/agents/register", post(api_register_agent))
        .route("/api/agents/cheapest/:service", get(api_cheapest_agent))
        // Treasury
        .route("/api/treasury/balances", get(api_treasury_balances))
        .route("/api/treasury/rebalance", post(api_trigger_rebalance))
        // Policy administration (models the external admin action)
        .route("/api/admin/policy/freeze", post(api_set_frozen))
        // Payment-protected demo resource
        .route("/api/oracle/price", get(api_oracle_price))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state));

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("PayGrid Server running at http://{addr}");
    tracing::info!("Health:    http://localhost:{}/api/health", args.port);
    tracing::info!("Task:      POST http://localhost:{}/api/task", args.port);
    tracing::info!("Treasury:  http://localhost:{}/api/treasury/balances", args.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Wire the in-memory backends together: custodial transfers credit the
/// intermediate account, facility deposits drain it.
async fn bootstrap(args: &Args) -> anyhow::Result<AppState> {
    let registry = Arc::new(MemoryAgentRegistry::new());
    let ledger = Arc::new(
        MemoryEscrowLedger::new(ChainAddress::new("0xserver-buyer"))
            .with_registry(registry.clone()),
    );
    let engine = Arc::new(EscrowEngine::new(ledger, registry.clone()));
    let coordinator = TaskSettlementCoordinator::new(engine.clone(), Arc::new(EchoExecutor));

    let intermediate = Arc::new(MemoryChainAccount::new(ChainAddress::new("0xtransit")));
    let custodial: Arc<dyn CustodialWallet> = match args.wallet_backend.as_str() {
        "http" => {
            let store = FileStore::new(&args.data_dir);
            Arc::new(
                HttpCustodialWallet::load_or_create(WalletProviderConfig::from_env(), &store)
                    .await
                    .map_err(|e| anyhow::anyhow!("{e}"))?,
            )
        }
        _ => Arc::new(
            MemoryCustodialWallet::new(args.custodial_balance)
                .with_destination(intermediate.balance_handle()),
        ),
    };
    let facility = Arc::new(MemoryPaymentFacility::new(intermediate.balance_handle()));
    let resident_wallet = intermediate.address().clone();

    let rebalancer = Arc::new(CrossLedgerRebalancer::new(
        custodial,
        intermediate,
        facility,
        RebalanceConfig {
            low_balance_threshold: args.low_balance_threshold,
            refill_amount: args.refill_amount,
            minimum_viable_amount: args.minimum_viable_amount,
            poll: PollConfig::default(),
            settle_delay: Duration::from_secs(5),
        },
    ));

    let policy_store = Arc::new(MemoryPolicyStore::new());
    let gate = SellerPolicyGate::new(policy_store.clone());

    // The server's own selling agent; protected routes are admitted or
    // denied on its policy record.
    let resident_agent = registry
        .register_agent(
            resident_wallet.clone(),
            "paygrid-oracle",
            "oracle",
            Decimal::new(1, 2),
        )
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let oracle_requirements = PaymentRequirements {
        scheme: "exact".to_string(),
        price: Decimal::new(1, 2),
        network: "base".to_string(),
        pay_to: resident_wallet.to_string(),
    };

    Ok(AppState {
        engine,
        coordinator,
        gate,
        rebalancer,
        registry,
        policy_store,
        verifier: Arc::new(AcceptAllVerifier),
        resident_agent,
        oracle_requirements,
    })
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(err: PayGridError) -> ApiError {
    let status = match &err {
        PayGridError::NotFound { .. } => StatusCode::NOT_FOUND,
        PayGridError::NoProviderAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PayGridError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        PayGridError::PolicyFrozen { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": err.to_string(), "code": err.error_code() })),
    )
}

async fn api_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct TaskRequest {
    query: String,
}

async fn api_process_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let settlement = state
        .coordinator
        .process_query(&request.query)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({
        "result": settlement.result,
        "cost": settlement.cost,
        "provider_id": settlement.provider_id,
        "escrow_id": settlement.escrow_id,
    })))
}

async fn api_accept_task(
    State(state): State<Arc<AppState>>,
    Path(escrow_id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .coordinator
        .accept(EscrowId(escrow_id))
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "escrow_id": escrow_id, "released": true })))
}

async fn api_get_escrow(
    State(state): State<Arc<AppState>>,
    Path(escrow_id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .engine
        .get_escrow(EscrowId(escrow_id))
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}

#[derive(Deserialize)]
struct RegisterAgentRequest {
    wallet: String,
    name: String,
    service_type: String,
    price_per_task: Decimal,
}

async fn api_register_agent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterAgentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = state
        .registry
        .register_agent(
            ChainAddress::new(request.wallet),
            &request.name,
            &request.service_type,
            request.price_per_task,
        )
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "agent_id": id })))
}

async fn api_cheapest_agent(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (id, price) = state
        .engine
        .find_cheapest_provider(&service)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "agent_id": id, "price_per_task": price })))
}

async fn api_treasury_balances(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.rebalancer.snapshot().await.map_err(error_response)?;
    Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
}

async fn api_trigger_rebalance(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = state
        .rebalancer
        .check_and_refill()
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}

#[derive(Deserialize)]
struct FreezeRequest {
    agent_id: u64,
    frozen: bool,
}

async fn api_set_frozen(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FreezeRequest>,
) -> Json<serde_json::Value> {
    state
        .policy_store
        .set_frozen(AgentId(request.agent_id), request.frozen)
        .await;
    Json(json!({ "agent_id": request.agent_id, "frozen": request.frozen }))
}

/// Payment-protected demo resource.
///
/// Admission order: policy gate first, then the payment challenge, then
/// verification. A frozen agent is rejected before any payment work.
async fn api_oracle_price(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .gate
        .enforce(state.resident_agent, "/api/oracle/price")
        .await
        .map_err(error_response)?;

    let payment = headers
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if payment.is_empty() {
        let challenge = PaymentChallenge::for_route(&state.oracle_requirements);
        let body = serde_json::to_value(&challenge)
            .unwrap_or_else(|_| json!({ "error": "payment required" }));
        return Err((StatusCode::PAYMENT_REQUIRED, Json(body)));
    }
    if !state
        .verifier
        .verify(payment, &state.oracle_requirements)
        .await
    {
        return Err((
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({ "error": "payment verification failed" })),
        ));
    }

    Ok(Json(json!({ "pair": "ETH/USD", "price": "2391.40" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn test_args() -> Args {
        Args {
            host: "127.0.0.1".to_string(),
            port: 0,
            rebalance_interval_secs: 300,
            low_balance_threshold: Decimal::from(5),
            refill_amount: Decimal::from(20),
            minimum_viable_amount: Decimal::ONE,
            custodial_balance: Decimal::from(100),
            wallet_backend: "memory".to_string(),
            data_dir: ".paygrid-test".to_string(),
        }
    }

    fn paying_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, HeaderValue::from_static("signed-payload"));
        headers
    }

    #[tokio::test]
    async fn frozen_agent_is_denied_despite_valid_payment() {
        // The verifier accepts "signed-payload", so the only thing that can
        // produce a 403 here is the gate firing before verification.
        let state = bootstrap(&test_args()).await.unwrap();
        let resident = state.resident_agent;
        state.policy_store.set_frozen(resident, true).await;
        let state = Arc::new(state);

        let (status, body) = api_oracle_price(State(state.clone()), paying_headers())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.0["code"], "POLICY_FROZEN");

        // Same payment passes once the agent is thawed.
        state.policy_store.set_frozen(resident, false).await;
        assert!(api_oracle_price(State(state), paying_headers())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn missing_payment_yields_challenge() {
        let state = Arc::new(bootstrap(&test_args()).await.unwrap());

        let (status, body) = api_oracle_price(State(state), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body.0["accepts"][0]["scheme"], "exact");
    }
}
