pub mod data {
    pub mod datasources {
        pub mod backend_datasource;
        pub mod customer_info_cache_datasource;
        pub mod receipt_fetcher;
        pub mod sk1_payment_queue_datasource;
        pub mod sk1_transaction_source;
        pub mod sk2_store_datasource;
        pub mod sk2_transaction_source;
        pub mod store_helpers_datasource;
        pub(crate) mod utils;
    }
    pub mod models {
        pub mod backend {
            pub mod customer_info_response_model;
            pub mod post_offer_model;
            pub mod post_receipt_request_model;
        }
    }
    pub mod repositories {
        mod pending_transaction_registry;
        pub mod purchases_orchestrator;
    }
}

pub mod domain {
    pub mod entities {
        pub mod customer_info;
        pub mod package;
        pub mod promotional_offer;
        pub mod purchase_intent;
        pub mod purchase_result;
        pub mod receipt_refresh_policy;
        pub mod store_product;
        pub mod store_transaction;
        pub mod system_info;
    }
    pub mod repositories {
        pub mod purchases_repository;
    }
}

pub mod config;
pub mod errors;
pub mod util;
