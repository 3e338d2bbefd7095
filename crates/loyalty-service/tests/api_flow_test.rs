//! HTTP 端到端流程测试
//!
//! 真实路由 + MemoryAccountStore，计算服务由脚本化客户端替代。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio_test::assert_ok;
use tower::ServiceExt;

use loyalty_service::accrual::{
    AccrualClient, AccrualReport, AccrualResponse, AccrualWorker, TickOutcome,
};
use loyalty_service::models::{OrderNumber, OrderStatus};
use loyalty_service::repository::MemoryAccountStore;
use loyalty_service::{AppState, Result, build_router};
use loyalty_shared::config::AuthConfig;
use loyalty_shared::test_utils::test_auth_config;

const ALICE_ORDER: &str = "79927398713";
const SETTLEMENT_ORDER: &str = "2377225624";

/// 按订单号返回预设结果，未预设的订单视为未登记
#[derive(Default)]
struct ScriptedAccrual {
    responses: Mutex<HashMap<OrderNumber, AccrualResponse>>,
}

impl ScriptedAccrual {
    fn set(&self, number: &str, response: AccrualResponse) {
        let number: OrderNumber = number.parse().unwrap();
        self.responses.lock().insert(number, response);
    }
}

#[async_trait]
impl AccrualClient for ScriptedAccrual {
    async fn fetch(&self, number: OrderNumber) -> Result<AccrualResponse> {
        Ok(self
            .responses
            .lock()
            .get(&number)
            .cloned()
            .unwrap_or(AccrualResponse::Unexpected(204)))
    }
}

struct Harness {
    app: Router,
    worker: AccrualWorker,
    accrual: Arc<ScriptedAccrual>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryAccountStore::new());
    let accrual = Arc::new(ScriptedAccrual::default());
    let state = AppState::new(store.clone(), &test_auth_config());

    Harness {
        app: build_router(state, Duration::from_secs(10)),
        worker: AccrualWorker::new(
            store,
            accrual.clone(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        ),
        accrual,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = assert_ok!(app.clone().oneshot(request).await);
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn text_request(uri: &str, token: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn register(app: &Router, login: &str) -> String {
    let body = json!({"login": login, "password": "pw-123"}).to_string();
    let (status, headers, body) =
        send(app, json_request("POST", "/api/user/register", None, &body)).await;
    assert_eq!(status, StatusCode::OK);

    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(
        headers[header::AUTHORIZATION].to_str().unwrap(),
        format!("Bearer {token}")
    );
    assert!(
        headers[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .starts_with(&format!("jwt={token}"))
    );
    token
}

#[tokio::test]
async fn test_full_loyalty_scenario() {
    let Harness {
        app,
        worker,
        accrual,
    } = harness();

    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    // 上传订单：新订单 202，重复上传 200，他人订单 409
    let (status, _, body) = send(&app, text_request("/api/user/orders", &alice, ALICE_ORDER)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "NEW");

    let (status, _, _) = send(&app, text_request("/api/user/orders", &alice, ALICE_ORDER)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, text_request("/api/user/orders", &bob, ALICE_ORDER)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 余额为 0 时提现
    let withdraw = json!({"order": SETTLEMENT_ORDER, "sum": 100}).to_string();
    let (status, _, body) = send(
        &app,
        json_request("POST", "/api/user/balance/withdraw", Some(&alice), &withdraw),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    // 对账：计算完成，入账 500
    accrual.set(
        ALICE_ORDER,
        AccrualResponse::Ready(AccrualReport {
            order: ALICE_ORDER.to_string(),
            status: OrderStatus::Processed,
            accrual: Some(Decimal::from(500)),
        }),
    );
    assert_eq!(
        worker.tick().await,
        TickOutcome::Completed {
            applied: 1,
            skipped: 0
        }
    );
    // 终态订单不再参与对账
    assert_eq!(worker.tick().await, TickOutcome::Idle);

    let (status, _, body) = send(&app, get_request("/api/user/balance", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"].as_f64(), Some(500.0));
    assert_eq!(body["withdrawn"].as_f64(), Some(0.0));

    let (status, _, body) = send(&app, get_request("/api/user/orders", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["number"], ALICE_ORDER);
    assert_eq!(orders[0]["status"], "PROCESSED");
    assert_eq!(orders[0]["accrual"].as_f64(), Some(500.0));

    // 余额充足后提现成功，同一结算订单号不能重复使用
    let (status, _, _) = send(
        &app,
        json_request("POST", "/api/user/balance/withdraw", Some(&alice), &withdraw),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &app,
        json_request("POST", "/api/user/balance/withdraw", Some(&alice), &withdraw),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, _, body) = send(&app, get_request("/api/user/balance", &alice)).await;
    assert_eq!(body["current"].as_f64(), Some(400.0));
    assert_eq!(body["withdrawn"].as_f64(), Some(100.0));

    for uri in ["/api/user/withdrawals", "/api/user/balance/withdrawals"] {
        let (status, _, body) = send(&app, get_request(uri, &alice)).await;
        assert_eq!(status, StatusCode::OK);
        let withdrawals = body.as_array().unwrap();
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0]["order"], SETTLEMENT_ORDER);
        assert_eq!(withdrawals[0]["sum"].as_f64(), Some(100.0));
    }

    // bob 没有订单与提现记录
    let (status, _, _) = send(&app, get_request("/api/user/orders", &bob)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, get_request("/api/user/withdrawals", &bob)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_invalid_order_number_creates_nothing() {
    let Harness { app, .. } = harness();
    let token = register(&app, "carol").await;

    for raw in ["1234567812345678", "abc", ""] {
        let (status, _, _) = send(&app, text_request("/api/user/orders", &token, raw)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{raw:?}");
    }

    let (status, _, _) = send(&app, get_request("/api/user/orders", &token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_auth_errors() {
    let Harness { app, .. } = harness();
    register(&app, "dave").await;

    // 重复注册
    let creds = json!({"login": "dave", "password": "pw-123"}).to_string();
    let (status, _, body) = send(&app, json_request("POST", "/api/user/register", None, &creds)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "LOGIN_TAKEN");

    // 格式错误的请求体
    let (status, _, _) = send(&app, json_request("POST", "/api/user/register", None, "{")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let empty = json!({"login": "", "password": "x"}).to_string();
    let (status, _, _) = send(&app, json_request("POST", "/api/user/login", None, &empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 密码错误与未知用户一致返回 401
    let wrong = json!({"login": "dave", "password": "nope"}).to_string();
    let (status, _, _) = send(&app, json_request("POST", "/api/user/login", None, &wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let unknown = json!({"login": "erin", "password": "pw-123"}).to_string();
    let (status, _, _) = send(&app, json_request("POST", "/api/user/login", None, &unknown)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 登录成功
    let (status, _, body) = send(&app, json_request("POST", "/api/user/login", None, &creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["expiresAt"].is_string());

    // 受保护路由
    let anonymous = Request::builder()
        .uri("/api/user/balance")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _, _) = send(&app, get_request("/api/user/balance", "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cookie_session_is_accepted() {
    let Harness { app, .. } = harness();
    let token = register(&app, "frank").await;

    let request = Request::builder()
        .uri("/api/user/balance")
        .header(header::COOKIE, format!("jwt={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn test_withdraw_validation() {
    let Harness { app, .. } = harness();
    let token = register(&app, "grace").await;

    let cases = [
        ("not json", "UNPROCESSABLE_REQUEST"),
        (r#"{"order":"1234567812345678","sum":1}"#, "INVALID_ORDER_NUMBER"),
        (r#"{"order":"2377225624","sum":0}"#, "INVALID_AMOUNT"),
        (r#"{"order":"2377225624","sum":-5}"#, "INVALID_AMOUNT"),
    ];
    for (body, code) in cases {
        let (status, _, resp) = send(
            &app,
            json_request("POST", "/api/user/balance/withdraw", Some(&token), body),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(resp["code"], code);
    }
}

#[tokio::test]
async fn test_probes() {
    let Harness { app, .. } = harness();

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, headers, _) = send(&app, health).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));

    let ready = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, _, body) = send(&app, ready).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"], "ok");
}

#[tokio::test]
async fn test_tick_skips_unregistered_orders() {
    let Harness {
        app,
        worker,
        accrual,
    } = harness();
    let token = register(&app, "heidi").await;

    let (status, _, _) = send(&app, text_request("/api/user/orders", &token, "12345678903")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    assert_eq!(
        worker.tick().await,
        TickOutcome::Completed {
            applied: 0,
            skipped: 1
        }
    );

    accrual.set(
        "12345678903",
        AccrualResponse::Ready(AccrualReport {
            order: "12345678903".to_string(),
            status: OrderStatus::Processing,
            accrual: None,
        }),
    );
    assert_eq!(
        worker.tick().await,
        TickOutcome::Completed {
            applied: 1,
            skipped: 0
        }
    );

    let (_, _, body) = send(&app, get_request("/api/user/orders", &token)).await;
    assert_eq!(body[0]["status"], "PROCESSING");
    assert!(body[0].get("accrual").is_none());
}

#[tokio::test]
async fn test_slow_request_times_out() {
    // 默认 bcrypt 成本下注册远超 1ms
    let auth = AuthConfig {
        bcrypt_cost: 12,
        ..test_auth_config()
    };
    let state = AppState::new(Arc::new(MemoryAccountStore::new()), &auth);
    let app = build_router(state, Duration::from_millis(1));

    let body = json!({"login": "slowpoke", "password": "pw-123"}).to_string();
    let (status, _, _) = send(&app, json_request("POST", "/api/user/register", None, &body)).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    let (status, _, _) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}
