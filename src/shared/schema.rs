diesel::table! {
    leads (id) {
        id -> Uuid,
        lead_name -> Text,
        phone -> Nullable<Text>,
        secondary_phone -> Nullable<Text>,
        email -> Nullable<Text>,
        location -> Nullable<Text>,
        note -> Nullable<Text>,
        status -> Text,
        schedule_time -> Nullable<Timestamptz>,
        created_by -> Uuid,
        created_by_email -> Text,
        assigned_to -> Nullable<Uuid>,
        assigned_to_email -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        is_deleted -> Bool,
    }
}

diesel::table! {
    comments (id) {
        id -> Uuid,
        lead_id -> Uuid,
        comment_text -> Text,
        status -> Nullable<Text>,
        created_by -> Uuid,
        created_by_email -> Text,
        created_at -> Timestamptz,
        is_deleted -> Bool,
    }
}

diesel::table! {
    po_data (id) {
        id -> Uuid,
        lead_id -> Uuid,
        amount_received -> Numeric,
        amount_remaining -> Numeric,
        release_date -> Nullable<Date>,
        note -> Nullable<Text>,
        created_by -> Uuid,
        created_by_email -> Text,
        company_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    profiles (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        phone -> Nullable<Text>,
        address -> Nullable<Text>,
        gender -> Nullable<Text>,
        role_id -> Int4,
        company_id -> Nullable<Uuid>,
        custom_message -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    company (id) {
        id -> Uuid,
        name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        details -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    broadcast_notifications (id) {
        id -> Uuid,
        title -> Text,
        message -> Text,
        created_by -> Uuid,
        created_by_email -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(comments -> leads (lead_id));
diesel::joinable!(po_data -> leads (lead_id));
diesel::joinable!(profiles -> company (company_id));

diesel::allow_tables_to_appear_in_same_query!(
    leads,
    comments,
    po_data,
    profiles,
    company,
    broadcast_notifications,
);
