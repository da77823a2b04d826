//! HTTP tests for the utility billing API
//!
//! Each test builds the full router over an in-memory store seeded with one
//! landlord, one property and two leases (Alice 60%, Bob 40% where split).

use axum::http::StatusCode;
use axum_test::TestServer;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use core_kernel::{ChargeId, UserId};
use domain_allocation::UtilityType;
use interface_api::auth::create_token;
use interface_api::config::ApiConfig;
use interface_api::{create_router, AppState};
use test_utils::Landlord;

const SECRET: &str = "test-secret";

struct Harness {
    server: TestServer,
    landlord: Landlord,
    token: String,
}

async fn harness_with(config: ApiConfig) -> Harness {
    let landlord = Landlord::new().await;
    let config = ApiConfig {
        jwt_secret: SECRET.to_string(),
        ..config
    };
    let state = AppState::new(landlord.store.clone(), landlord.clock.clone(), config).unwrap();
    let server = TestServer::new(create_router(state)).unwrap();
    let token = create_token(landlord.owner, SECRET, 1).unwrap();
    Harness { server, landlord, token }
}

async fn harness() -> Harness {
    harness_with(ApiConfig::default()).await
}

fn amount(money: &Value) -> Decimal {
    money["amount"].as_str().unwrap().parse().unwrap()
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

impl Harness {
    async fn split_electricity(&self, a: &str, b: &str) -> axum_test::TestResponse {
        let path = format!(
            "/api/v1/properties/{}/allocations/Electric",
            self.landlord.property.id
        );
        self.server
            .put(&path)
            .authorization_bearer(&self.token)
            .json(&json!({
                "shares": [
                    { "lease_id": self.landlord.lease(0).id, "percentage": a },
                    { "lease_id": self.landlord.lease(1).id, "percentage": b },
                ]
            }))
            .await
    }

    async fn create_bill(&self, month: &str, total: &str, due: &str) -> axum_test::TestResponse {
        self.server
            .post("/api/v1/bills")
            .authorization_bearer(&self.token)
            .json(&json!({
                "property_id": self.landlord.property.id,
                "utility_type": "Electric",
                "provider": "City Power",
                "billing_month": month,
                "total_amount": total,
                "due_date": due,
            }))
            .await
    }

    async fn bill_detail(&self, bill_id: &str) -> Value {
        self.server
            .get(&format!("/api/v1/bills/{}", bill_id))
            .authorization_bearer(&self.token)
            .await
            .json::<Value>()
    }

    /// Id of the charge for lease `index` on a bill
    fn charge_for(&self, detail: &Value, index: usize) -> String {
        let lease_id = self.landlord.lease(index).id.to_string();
        detail["charges"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["lease_id"] == lease_id)
            .map(|c| c["id"].as_str().unwrap().to_string())
            .unwrap()
    }

    async fn pay(&self, charge_id: &str, amount: &str) -> axum_test::TestResponse {
        self.server
            .post(&format!("/api/v1/charges/{}/payments", charge_id))
            .authorization_bearer(&self.token)
            .json(&json!({ "amount": amount, "method": "Bank Transfer" }))
            .await
    }
}

mod public_and_auth {
    use super::*;

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let h = harness().await;
        h.server.get("/health").await.assert_status_ok();

        let ready = h.server.get("/health/ready").await;
        ready.assert_status_ok();
        assert_eq!(ready.json::<Value>()["status"], "ready");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let h = harness().await;
        let response = h.server.get("/api/v1/bills").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_is_rejected() {
        let h = harness().await;
        let token = create_token(h.landlord.owner, "other-secret", 1).unwrap();
        h.server
            .get("/api/v1/bills")
            .authorization_bearer(token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_other_owner_cannot_read_property_allocations() {
        let h = harness().await;
        let stranger = create_token(UserId::new(), SECRET, 1).unwrap();
        let response = h
            .server
            .get(&format!(
                "/api/v1/properties/{}/allocations/Electric",
                h.landlord.property.id
            ))
            .authorization_bearer(stranger)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json::<Value>()["error"]["code"], "permission");
    }
}

mod bills_and_payments {
    use super::*;

    #[tokio::test]
    async fn test_bill_is_split_by_allocation() {
        let h = harness().await;
        h.split_electricity("60", "40").await.assert_status_ok();

        let created = h.create_bill("2024-03", "300.00", "2024-03-20").await;
        created.assert_status(StatusCode::CREATED);
        let bill_id = created.json::<Value>()["id"].as_str().unwrap().to_string();

        let detail = h.bill_detail(&bill_id).await;
        let charges = detail["charges"].as_array().unwrap();
        assert_eq!(charges.len(), 2);

        let by_lease = |index: usize| {
            let lease_id = h.landlord.lease(index).id.to_string();
            charges.iter().find(|c| c["lease_id"] == lease_id).unwrap().clone()
        };
        assert_eq!(amount(&by_lease(0)["charged_amount"]), dec!(180));
        assert_eq!(amount(&by_lease(1)["charged_amount"]), dec!(120));
        assert_eq!(amount(&detail["owner_share"]), dec!(0));
    }

    #[tokio::test]
    async fn test_partial_then_full_payment() {
        let h = harness().await;
        h.split_electricity("60", "40").await;
        let bill_id = h.create_bill("2024-03", "300.00", "2024-03-20").await.json::<Value>()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let detail = h.bill_detail(&bill_id).await;
        let alice = h.charge_for(&detail, 0);
        let bob = h.charge_for(&detail, 1);

        let first = h.pay(&alice, "100.00").await;
        first.assert_status(StatusCode::CREATED);
        let receipt = first.json::<Value>();
        assert_eq!(amount(&receipt["remaining_balance"]), dec!(80));
        assert_eq!(receipt["is_fully_paid"], false);
        assert_eq!(receipt["all_charges_paid_on_bill"], false);

        let second = h.pay(&alice, "80.00").await.json::<Value>();
        assert_eq!(amount(&second["remaining_balance"]), dec!(0));
        assert_eq!(second["is_fully_paid"], true);
        assert_eq!(second["all_charges_paid_on_bill"], false);
        assert_eq!(h.bill_detail(&bill_id).await["is_paid"], false);

        let last = h.pay(&bob, "120.00").await.json::<Value>();
        assert_eq!(last["all_charges_paid_on_bill"], true);
        assert_eq!(h.bill_detail(&bill_id).await["is_paid"], true);
    }

    #[tokio::test]
    async fn test_overpayment_reports_remaining_balance() {
        let h = harness().await;
        h.split_electricity("60", "40").await;
        let bill_id = h.create_bill("2024-03", "300.00", "2024-03-20").await.json::<Value>()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let alice = h.charge_for(&h.bill_detail(&bill_id).await, 0);
        h.pay(&alice, "100.00").await;

        let response = h.pay(&alice, "100.00").await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let error = &response.json::<Value>()["error"];
        assert_eq!(error["code"], "overpayment");
        assert_eq!(amount(&error["details"]["remaining_balance"]), dec!(80));
    }

    #[tokio::test]
    async fn test_sub_cent_amounts_fail_validation() {
        let h = harness().await;
        h.split_electricity("60", "40").await;
        let response = h.create_bill("2024-03", "300.004", "2024-03-20").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], "validation");

        let bill_id = h.create_bill("2024-03", "300.00", "2024-03-20").await.json::<Value>()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let alice = h.charge_for(&h.bill_detail(&bill_id).await, 0);
        let response = h.pay(&alice, "10.004").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], "validation");

        let detail = h.bill_detail(&bill_id).await;
        let charge = detail["charges"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["id"] == alice.as_str())
            .unwrap();
        assert_eq!(amount(&charge["paid_amount"]), dec!(0));
    }

    #[tokio::test]
    async fn test_duplicate_bill_is_a_conflict() {
        let h = harness().await;
        h.create_bill("2024-03", "300.00", "2024-03-20").await.assert_status(StatusCode::CREATED);

        let response = h.create_bill("2024-03", "120.00", "2024-03-25").await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["error"]["code"], "duplicate");

        let bills = h
            .server
            .get("/api/v1/bills")
            .authorization_bearer(&h.token)
            .await
            .json::<Value>();
        assert_eq!(bills.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_provider_fails_validation() {
        let h = harness().await;
        let response = h
            .server
            .post("/api/v1/bills")
            .authorization_bearer(&h.token)
            .json(&json!({
                "property_id": h.landlord.property.id,
                "utility_type": "Water",
                "provider": "",
                "billing_month": "2024-03",
                "total_amount": "50",
                "due_date": "2024-03-20",
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], "validation");
    }

    #[tokio::test]
    async fn test_malformed_id_is_bad_request() {
        let h = harness().await;
        let response = h
            .server
            .get("/api/v1/bills/not-a-uuid")
            .authorization_bearer(&h.token)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_bulk_mark_paid_reports_each_charge() {
        let h = harness().await;
        h.split_electricity("60", "40").await;
        let bill_id = h.create_bill("2024-03", "300.00", "2024-03-20").await.json::<Value>()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let alice = h.charge_for(&h.bill_detail(&bill_id).await, 0);

        let response = h
            .server
            .post("/api/v1/charges/bulk/mark-paid")
            .authorization_bearer(&h.token)
            .json(&json!({ "charge_ids": [alice, ChargeId::new()], "is_paid": true }))
            .await;
        response.assert_status_ok();
        let batch = response.json::<Value>();
        assert_eq!(batch["succeeded"], 1);
        assert_eq!(batch["failed"], 1);
        assert_eq!(batch["success"], false);
        assert_eq!(batch["results"][1]["error"]["kind"], "not_found");
    }
}

mod allocations {
    use super::*;

    #[tokio::test]
    async fn test_over_allocation_is_rejected_and_nothing_saved() {
        let h = harness().await;
        let response = h.split_electricity("70", "50").await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let error = &response.json::<Value>()["error"];
        assert_eq!(error["code"], "allocation_exceeded");
        assert_eq!(decimal(&error["details"]["total_percentage"]), dec!(120));

        let saved = h
            .server
            .get(&format!("/api/v1/leases/{}/allocations", h.landlord.lease(0).id))
            .authorization_bearer(&h.token)
            .await
            .json::<Value>();
        assert!(saved.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summary_reports_owner_share() {
        let h = harness().await;
        h.split_electricity("50", "30").await.assert_status_ok();

        let summary = h
            .server
            .get(&format!(
                "/api/v1/properties/{}/allocations/Electric",
                h.landlord.property.id
            ))
            .authorization_bearer(&h.token)
            .await
            .json::<Value>();
        assert_eq!(decimal(&summary["total_percentage"]), dec!(80));
        assert_eq!(decimal(&summary["owner_percentage"]), dec!(20));
        assert_eq!(summary["is_complete"], false);
    }

    #[tokio::test]
    async fn test_split_preview_uses_configured_currency() {
        let h = harness().await;
        h.landlord.split(UtilityType::Water, &[dec!(50), dec!(25)]).await;

        let response = h
            .server
            .get(&format!(
                "/api/v1/properties/{}/split-preview?utility_type=Water&total_amount=200",
                h.landlord.property.id
            ))
            .authorization_bearer(&h.token)
            .await;
        response.assert_status_ok();
        let preview = response.json::<Value>();
        assert_eq!(preview["owner_amount"]["currency"], "USD");
        assert_eq!(amount(&preview["owner_amount"]), dec!(50));
    }
}

mod insights {
    use super::*;

    #[tokio::test]
    async fn test_overdue_bill_is_reported() {
        let h = harness().await;
        h.create_bill("2024-01", "90.00", "2024-01-10").await.assert_status(StatusCode::CREATED);

        let overdue = h
            .server
            .get("/api/v1/insights/overdue?days_threshold=30")
            .authorization_bearer(&h.token)
            .await
            .json::<Value>();
        let items = overdue.as_array().unwrap();
        assert_eq!(items.len(), 1);
        // The fixture clock reads 2024-03-15
        assert_eq!(items[0]["days_overdue"], 65);
    }

    #[tokio::test]
    async fn test_invalid_threshold_is_rejected() {
        let h = harness().await;
        let response = h
            .server
            .get("/api/v1/insights/anomalies?threshold=0")
            .authorization_bearer(&h.token)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

mod rate_limiting {
    use super::*;

    fn strict() -> ApiConfig {
        ApiConfig {
            rate_limit_max_requests: 2,
            ..ApiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_mutations_beyond_limit_get_retry_after() {
        let h = harness_with(strict()).await;
        h.create_bill("2024-01", "90.00", "2024-01-20").await.assert_status(StatusCode::CREATED);
        h.create_bill("2024-02", "90.00", "2024-02-20").await.assert_status(StatusCode::CREATED);

        let limited = h.create_bill("2024-03", "90.00", "2024-03-20").await;
        limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = limited.header("retry-after").to_str().unwrap().parse().unwrap();
        assert!(retry_after >= 1 && retry_after <= 60);
        assert_eq!(limited.json::<Value>()["error"]["code"], "rate_limited");
    }

    #[tokio::test]
    async fn test_reads_are_not_limited() {
        let h = harness_with(strict()).await;
        for _ in 0..5 {
            h.server
                .get("/api/v1/bills")
                .authorization_bearer(&h.token)
                .await
                .assert_status_ok();
        }
    }

    #[tokio::test]
    async fn test_limits_are_per_mutation_kind() {
        let h = harness_with(strict()).await;
        h.create_bill("2024-01", "90.00", "2024-01-20").await;
        h.create_bill("2024-02", "90.00", "2024-02-20").await;

        h.split_electricity("60", "40").await.assert_status_ok();
    }
}
