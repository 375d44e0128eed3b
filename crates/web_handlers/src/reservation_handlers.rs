use actix_web::{HttpResponse, Result, web};
use chrono::Utc;

use reservation_engine::{
    BookingAttempt, Reservation, ReservationAmendment, ReservationDraft, SubmissionError,
    SubmissionState,
};

use crate::errors::ApiError;
use crate::requester::RequesterToken;
use crate::state::AppState;

/// Validates and prices a booking form without submitting it
pub async fn quote_reservation(
    state: web::Data<AppState>,
    draft: web::Json<ReservationDraft>,
) -> Result<HttpResponse, ApiError> {
    let campgrounds = state.campgrounds().await?;
    let promotions = state.promotions().await?;

    let mut attempt = BookingAttempt::new(state.assembler);
    match attempt.revise(&draft, &campgrounds, &promotions, Utc::now()) {
        SubmissionState::Priced(priced) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "state": "priced",
            "quote": priced
        }))),
        SubmissionState::Incomplete(Some(error)) => Err(error.clone().into()),
        other => Err(ApiError::Internal(format!("unexpected quote state {:?}", other))),
    }
}

/// Assembles, prices and submits a reservation for the requester
pub async fn create_reservation(
    state: web::Data<AppState>,
    token: RequesterToken,
    draft: web::Json<ReservationDraft>,
) -> Result<HttpResponse, ApiError> {
    let campgrounds = state.campgrounds().await?;
    let promotions = state.promotions().await?;
    let now = Utc::now();

    let mut attempt = BookingAttempt::new(state.assembler);
    if let SubmissionState::Incomplete(Some(error)) =
        attempt.revise(&draft, &campgrounds, &promotions, now)
    {
        return Err(error.clone().into());
    }

    let (notice, promotion_rejection) = attempt
        .priced()
        .map(|p| (p.notice, p.promotion_rejection))
        .unwrap_or_default();

    let result = attempt
        .submit(
            state.reservations.as_ref(),
            state.ledger.as_ref(),
            token.as_str(),
            now,
        )
        .await;

    match result {
        Ok(reservation) => {
            state
                .lock_stores()?
                .entry(token.0.clone())
                .or_default()
                .upsert(reservation.clone());

            Ok(HttpResponse::Created().json(serde_json::json!({
                "success": true,
                "data": reservation,
                "notice": notice,
                "promotionRejection": promotion_rejection
            })))
        }
        // Hand back the re-priced quote so the guest can confirm at full price
        Err(SubmissionError::PromotionUnavailable { code }) => {
            Ok(HttpResponse::Conflict().json(serde_json::json!({
                "error": "promotion_unavailable",
                "message": format!("Promotion code {} is no longer available", code),
                "quote": attempt.priced()
            })))
        }
        Err(e) => Err(e.into()),
    }
}

/// Refreshes the requester's mirror from the persistence API and returns it
pub async fn list_reservations(
    state: web::Data<AppState>,
    token: RequesterToken,
) -> Result<HttpResponse, ApiError> {
    let reservations = state.reservations.list_reservations(token.as_str()).await?;

    let mut stores = state.lock_stores()?;
    if reservations.is_empty() {
        // Nothing to mirror; keep no entry for this token
        stores.remove(token.as_str());
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": 0,
            "data": []
        })));
    }

    let store = stores.entry(token.0.clone()).or_default();
    store.clear();
    store.sync(reservations);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": store.len(),
        "data": store.list()
    })))
}

/// Changes the dates or the breakfast add-on of an existing reservation
pub async fn amend_reservation(
    state: web::Data<AppState>,
    token: RequesterToken,
    path: web::Path<String>,
    amendment: web::Json<ReservationAmendment>,
) -> Result<HttpResponse, ApiError> {
    let reservation_id = path.into_inner();
    let reservation = find_reservation(&state, &token, &reservation_id).await?;

    let campgrounds = state.campgrounds().await?;
    let campground = campgrounds
        .iter()
        .find(|c| c.id == reservation.campground_id)
        .ok_or_else(|| {
            ApiError::Assembly(reservation_engine::AssemblyError::UnknownCampground(
                reservation.campground_id.clone(),
            ))
        })?;

    let amended = state
        .assembler
        .amend(&reservation, &amendment, campground, Utc::now())?;

    state
        .reservations
        .update_reservation(token.as_str(), &reservation_id, &amended.patch)
        .await?;

    state
        .lock_stores()?
        .entry(token.0.clone())
        .or_default()
        .upsert(amended.reservation.clone());

    log::info!("Reservation {} amended", reservation_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": amended.reservation,
        "notice": amended.notice
    })))
}

/// Cancels a reservation. The promotion it redeemed stays redeemed.
pub async fn cancel_reservation(
    state: web::Data<AppState>,
    token: RequesterToken,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let reservation_id = path.into_inner();

    state
        .reservations
        .delete_reservation(token.as_str(), &reservation_id)
        .await?;

    let mut stores = state.lock_stores()?;
    let emptied = match stores.get_mut(token.as_str()) {
        Some(store) => {
            store.remove(&reservation_id);
            store.is_empty()
        }
        None => false,
    };
    if emptied {
        stores.remove(token.as_str());
    }

    log::info!("Reservation {} cancelled", reservation_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// Ends the requester's session on this server by dropping their mirror
pub async fn sign_out(
    state: web::Data<AppState>,
    token: RequesterToken,
) -> Result<HttpResponse, ApiError> {
    let dropped = state.forget_requester(token.as_str())?;
    log::debug!("Dropped reservation mirror with {} entries", dropped);

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// Looks in the mirror first, then refreshes it from the persistence API
async fn find_reservation(
    state: &AppState,
    token: &RequesterToken,
    reservation_id: &str,
) -> Result<Reservation, ApiError> {
    let cached = state
        .lock_stores()?
        .get(token.as_str())
        .and_then(|store| store.get(reservation_id).cloned());
    if let Some(reservation) = cached {
        return Ok(reservation);
    }

    let reservations = state.reservations.list_reservations(token.as_str()).await?;
    if reservations.is_empty() {
        return Err(ApiError::ReservationNotFound(reservation_id.to_string()));
    }

    let mut stores = state.lock_stores()?;
    let store = stores.entry(token.0.clone()).or_default();
    store.sync(reservations);

    store
        .get(reservation_id)
        .cloned()
        .ok_or_else(|| ApiError::ReservationNotFound(reservation_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use crate::configure_api;
    use crate::test_support::{FakeBookingApi, app_state};

    fn draft_json(check_in: chrono::NaiveDate, nights: i64, code: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "nameLastname": "Jo Camper",
            "tel": "0812345678",
            "campground": "cg-1",
            "checkInDate": check_in,
            "checkOutDate": check_in + Duration::days(nights),
            "breakfast": true,
            "promotionCode": code
        })
    }

    fn tomorrow() -> chrono::NaiveDate {
        Utc::now().date_naive() + Duration::days(1)
    }

    #[actix_web::test]
    async fn test_quote_prices_and_clamps() {
        let api = FakeBookingApi::new(5, 0);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(api.clone())))
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/reservations/quote")
            .set_json(draft_json(tomorrow(), 10, Some("camp20")))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["state"], "priced");
        assert_eq!(body["quote"]["nights"], 3);
        assert_eq!(body["quote"]["notice"]["kind"], "clamped");
        assert_eq!(body["quote"]["request"]["price"]["totalAmount"], 165.0);
    }

    #[actix_web::test]
    async fn test_quote_lists_missing_fields() {
        let api = FakeBookingApi::new(5, 0);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(api)))
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/reservations/quote")
            .set_json(serde_json::json!({ "nameLastname": "Jo" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["fields"].as_array().unwrap().len(), 4);
    }

    #[actix_web::test]
    async fn test_create_requires_token() {
        let api = FakeBookingApi::new(5, 0);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(api)))
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/reservations")
            .set_json(draft_json(tomorrow(), 2, None))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_create_then_list_and_cancel() {
        let api = FakeBookingApi::new(5, 0);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(api.clone())))
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/reservations")
            .insert_header(("Authorization", "Bearer guest"))
            .set_json(draft_json(tomorrow(), 3, Some("CAMP20")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let id = body["data"]["_id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["price"]["totalAmount"], 165.0);
        assert_eq!(api.last_token(), Some("guest".to_string()));

        let req = test::TestRequest::get()
            .uri("/api/reservations")
            .insert_header(("Authorization", "Bearer guest"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 1);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/reservations/{}", id))
            .insert_header(("Authorization", "Bearer guest"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(api.reservation_count(), 0);
    }

    #[actix_web::test]
    async fn test_exhausted_promotion_returns_full_price_quote() {
        // The catalog still shows a free slot but the ledger already holds it
        let api = FakeBookingApi::new(1, 0);
        let state = app_state(api.clone());
        state.ledger.register("promo-1", 1, 0).await.unwrap();
        state.ledger.try_redeem("promo-1").await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/reservations")
            .insert_header(("Authorization", "Bearer guest"))
            .set_json(draft_json(tomorrow(), 3, Some("CAMP20")))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "promotion_unavailable");
        assert_eq!(body["quote"]["request"]["price"]["totalAmount"], 195.0);
        assert_eq!(api.reservation_count(), 0);
    }

    #[actix_web::test]
    async fn test_amend_reprices_existing_reservation() {
        let api = FakeBookingApi::new(5, 0);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(api.clone())))
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/reservations")
            .insert_header(("Authorization", "Bearer guest"))
            .set_json(draft_json(tomorrow(), 1, None))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let id = body["data"]["_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/api/reservations/{}", id))
            .insert_header(("Authorization", "Bearer guest"))
            .set_json(serde_json::json!({
                "checkOutDate": tomorrow() + Duration::days(2),
                "breakfast": false
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["data"]["price"]["totalAmount"], 100.0);
        assert_eq!(api.last_patch_total(), Some(dec!(100)));
    }

    #[actix_web::test]
    async fn test_mirrors_are_dropped_when_empty_or_signed_out() {
        let api = FakeBookingApi::new(5, 0);
        let state = app_state(api.clone());
        let stores = state.stores.clone();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_api),
        )
        .await;

        // A listing with nothing in it leaves no mirror behind
        let req = test::TestRequest::get()
            .uri("/api/reservations")
            .insert_header(("Authorization", "Bearer rotated-1"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 0);
        assert!(stores.lock().unwrap().is_empty());

        let req = test::TestRequest::post()
            .uri("/api/reservations")
            .insert_header(("Authorization", "Bearer rotated-2"))
            .set_json(draft_json(tomorrow(), 1, None))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let id = body["data"]["_id"].as_str().unwrap().to_string();
        assert!(stores.lock().unwrap().contains_key("rotated-2"));

        // Cancelling the last reservation drops the mirror
        let req = test::TestRequest::delete()
            .uri(&format!("/api/reservations/{}", id))
            .insert_header(("Authorization", "Bearer rotated-2"))
            .to_request();
        test::call_service(&app, req).await;
        assert!(stores.lock().unwrap().is_empty());

        let req = test::TestRequest::post()
            .uri("/api/reservations")
            .insert_header(("Authorization", "Bearer rotated-3"))
            .set_json(draft_json(tomorrow(), 1, None))
            .to_request();
        test::call_service(&app, req).await;
        assert_eq!(stores.lock().unwrap().len(), 1);

        let req = test::TestRequest::post()
            .uri("/api/session/sign-out")
            .insert_header(("Authorization", "Bearer rotated-3"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(stores.lock().unwrap().is_empty());
        assert_eq!(api.reservation_count(), 1);
    }

    #[actix_web::test]
    async fn test_amend_unknown_reservation_is_not_found() {
        let api = FakeBookingApi::new(5, 0);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(api)))
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/reservations/nope")
            .insert_header(("Authorization", "Bearer guest"))
            .set_json(serde_json::json!({ "breakfast": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
