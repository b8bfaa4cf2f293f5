//! Esquema Diesel (declarado manualmente). Reemplazable con `diesel print-schema`.

diesel::table! {
    flow_event_log (seq) {
        seq -> BigInt,
        flow_id -> Uuid,
        ts -> Timestamptz,
        event_type -> Text,
        payload -> Jsonb,
    }
}

diesel::table! {
    flow_checkpoints (id) {
        id -> BigInt,
        flow_id -> Uuid,
        phase -> Text,
        created_at -> Timestamptz,
        data -> Jsonb,
        progress -> Float8,
        can_resume -> Bool,
        produced_in_seq -> BigInt,
    }
}

diesel::table! {
    flow_execution_errors (id) {
        id -> BigInt,
        flow_id -> Uuid,
        phase -> Text,
        attempt_number -> Int4,
        error_class -> Text,
        details -> Nullable<Jsonb>,
        ts -> Timestamptz,
    }
}

diesel::table! {
    assets (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        engagement_id -> Uuid,
        application_name -> Text,
        environment -> Nullable<Text>,
        criticality -> Nullable<Text>,
        business_owner -> Nullable<Text>,
        operating_system -> Nullable<Text>,
        cpu_cores -> Nullable<Int4>,
        memory_gb -> Nullable<Float8>,
        storage_gb -> Nullable<Float8>,
        monthly_cost -> Nullable<Float8>,
        dependencies -> Nullable<Array<Text>>,
        technical_details -> Nullable<Jsonb>,
        custom_attributes -> Nullable<Jsonb>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    asset_compliance_scopes (asset_id, scope) {
        asset_id -> Uuid,
        scope -> Text,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    gaps (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        engagement_id -> Uuid,
        field_name -> Text,
        category -> Text,
        priority -> Text,
        status -> Text,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    questionnaire_responses (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        engagement_id -> Uuid,
        gap_id -> Nullable<Uuid>,
        field_name -> Text,
        value -> Jsonb,
        confidence -> Float8,
        status -> Text,
        asset_hint -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    flow_event_log,
    flow_checkpoints,
    flow_execution_errors,
    assets,
    asset_compliance_scopes,
    gaps,
    questionnaire_responses,
);
