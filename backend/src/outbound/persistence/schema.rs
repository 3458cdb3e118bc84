//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly.

diesel::table! {
    /// Idempotency reservations and stored responses.
    idempotency_records (key) {
        /// Client-supplied idempotency key.
        key -> Text,
        /// `reserved` or `stored`.
        #[max_length = 16]
        status -> Varchar,
        /// Body of the first successful response; null while reserved.
        response_body -> Nullable<Bytea>,
        /// Content type of the first successful response.
        content_type -> Nullable<Text>,
        /// When the row was created.
        created_at -> Timestamptz,
    }
}
