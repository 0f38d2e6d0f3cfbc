//! Diesel schema for code import coordination.

diesel::table! {
    /// Worker machines and their availability state.
    code_import_machines (id) {
        /// Machine identifier.
        id -> Int8,
        /// Unique hostname.
        #[max_length = 255]
        hostname -> Varchar,
        /// Availability state.
        #[max_length = 20]
        state -> Varchar,
        /// Last dispatcher poll.
        heartbeat -> Nullable<Timestamptz>,
        /// Registration timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Import configurations.
    code_imports (id) {
        /// Import identifier.
        id -> Int8,
        /// Tagged source location payload.
        source -> Jsonb,
        /// Unique target branch name.
        #[max_length = 255]
        target_branch -> Varchar,
        /// Review status.
        #[max_length = 20]
        review_status -> Varchar,
        /// Update interval override in seconds.
        update_interval_seconds -> Nullable<Int8>,
        /// Failed runs since the last success.
        consecutive_failure_count -> Int4,
        /// Date of the last successful run.
        date_last_successful -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Pending and running jobs, at most one per import.
    code_import_jobs (id) {
        /// Job identifier.
        id -> Int8,
        /// Owning import.
        import_id -> Int8,
        /// Lifecycle state.
        #[max_length = 20]
        state -> Varchar,
        /// Machine running the job.
        machine_id -> Nullable<Int8>,
        /// Earliest claim time.
        date_due -> Timestamptz,
        /// Creation timestamp.
        date_created -> Timestamptz,
        /// Claim timestamp.
        date_started -> Nullable<Timestamptz>,
        /// Last worker heartbeat.
        heartbeat -> Nullable<Timestamptz>,
        /// Last reported log excerpt.
        log_tail -> Text,
    }
}

diesel::table! {
    /// Finished job results.
    code_import_results (id) {
        /// Result identifier.
        id -> Uuid,
        /// Import the job ran for.
        import_id -> Int8,
        /// Machine that ran the job.
        machine_id -> Nullable<Int8>,
        /// Terminal status.
        #[max_length = 40]
        status -> Varchar,
        /// Last log excerpt.
        log_tail -> Text,
        /// Uploaded log reference.
        log_artifact_id -> Nullable<Int8>,
        /// Claim timestamp of the job.
        date_job_started -> Nullable<Timestamptz>,
        /// Finish timestamp.
        date_finished -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only audit events.
    code_import_events (sequence) {
        /// Insertion order.
        sequence -> Int8,
        /// Event identifier.
        id -> Uuid,
        /// Event kind.
        #[max_length = 40]
        kind -> Varchar,
        /// Machine involved.
        machine_id -> Nullable<Int8>,
        /// Import involved.
        import_id -> Nullable<Int8>,
        /// Free-text detail.
        detail -> Nullable<Text>,
        /// Recording timestamp.
        recorded_at -> Timestamptz,
    }
}

diesel::joinable!(code_import_jobs -> code_imports (import_id));
diesel::allow_tables_to_appear_in_same_query!(
    code_import_machines,
    code_imports,
    code_import_jobs,
    code_import_results,
    code_import_events,
);
