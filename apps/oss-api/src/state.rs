use std::sync::Arc;

use oss_service::OssService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<OssService>,
}
impl AppState {
	pub fn new(service: Arc<OssService>) -> Self {
		Self { service }
	}
}
