use std::sync::Arc;

use axum::Router;
use frenchquiz_backend_rust::create_app_with_repo;
use frenchquiz_backend_rust::transfer::TransferRepository;

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<TransferRepository>,
}

pub async fn create_test_app() -> TestApp {
    let repo = Arc::new(
        TransferRepository::in_memory()
            .await
            .expect("in-memory transfer db"),
    );
    TestApp {
        router: create_app_with_repo(Arc::clone(&repo)),
        repo,
    }
}
