//! # Web Handlers for the Campground Reservation Service
//!
//! This crate provides the HTTP handlers that expose the reservation engine.

use actix_web::web;

/// Shared application state and reservation mirrors
mod state;
pub use state::*;

/// Handler error type
mod errors;
pub use errors::*;

/// Bearer token extractor
mod requester;
pub use requester::*;

/// Quote, booking, amendment and cancellation handlers
mod reservation_handlers;
pub use reservation_handlers::*;

/// Promotion check and administration handlers
mod promotion_handlers;
pub use promotion_handlers::*;

#[cfg(test)]
mod test_support;

/// Registers every `/api` route
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/reservations")
                    .route("/quote", web::post().to(quote_reservation))
                    .route("", web::post().to(create_reservation))
                    .route("", web::get().to(list_reservations))
                    .route("/{reservation_id}", web::put().to(amend_reservation))
                    .route("/{reservation_id}", web::delete().to(cancel_reservation)),
            )
            .route("/session/sign-out", web::post().to(sign_out))
            .route("/promotions/check", web::post().to(check_promotion))
            .service(
                web::scope("/admin/promotions")
                    .route("", web::post().to(create_promotion))
                    .route("/{promotion_id}", web::put().to(update_promotion))
                    .route("/{promotion_id}", web::delete().to(delete_promotion)),
            ),
    );
}
