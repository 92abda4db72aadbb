// Database schema definitions
diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        password -> Varchar,
        salt -> Varchar,
        role -> Varchar,
        office -> Varchar,
        workstation -> Varchar,
        country -> Varchar,
        phone_number -> Varchar,
    }
}

diesel::table! {
    issues (id) {
        id -> Uuid,
        description -> Text,
        image_url -> Nullable<Varchar>,
        status -> Varchar,
        priority -> Varchar,
        created_by_id -> Uuid,
        created_by_name -> Varchar,
        created_by_email -> Varchar,
        assigned_to -> Nullable<Uuid>,
        location -> Nullable<Jsonb>,
        ai_metadata -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    offices (id) {
        id -> Uuid,
        name -> Varchar,
        country -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    chat_messages (id) {
        id -> Uuid,
        conversation_id -> Uuid,
        sender_id -> Uuid,
        sender_name -> Varchar,
        sender_role -> Varchar,
        message -> Text,
        created_at -> Timestamptz,
        read -> Bool,
    }
}

// created_by_id is a snapshot reference, not a foreign key: issues survive the
// deletion of their reporter.
diesel::joinable!(issues -> users (created_by_id));

diesel::allow_tables_to_appear_in_same_query!(users, issues, offices, chat_messages,);
