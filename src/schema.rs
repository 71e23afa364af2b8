diesel::table! {
    datasets (id) {
        id -> Text,
        owner_id -> Nullable<Text>,
        name -> Text,
        table_name -> Text,
        #[sql_name = "columns"]
        column_list -> Jsonb,
        uploaded_at -> Timestamptz,
    }
}

diesel::table! {
    conversations (id) {
        id -> Uuid,
        dataset_id -> Nullable<Text>,
        user_query -> Text,
        sql_query -> Text,
        response -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(conversations -> datasets (dataset_id));

diesel::allow_tables_to_appear_in_same_query!(datasets, conversations,);
