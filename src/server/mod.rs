pub mod api;

use log::info;
use std::error::Error;
use std::net::SocketAddr;

use api::AppState;

pub struct Server {
    addr: String,
    state: AppState,
    allowed_origin: String,
}

impl Server {
    pub fn new(addr: String, state: AppState, allowed_origin: String) -> Self {
        Self {
            addr,
            state,
            allowed_origin,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = api::router(self.state.clone(), &self.allowed_origin);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Assistant relay listening on http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}
