use std::collections::HashMap;

use actix_web::{get, post, web, Responder, Scope};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::message::{Message, MessageInfo, Priority, DEFAULT_TIMEOUT_SECS};
use crate::service::Service;
use crate::transport::sqlite::QueueStatistics;

#[derive(Deserialize)]
pub struct PublishRequest {
    content: String,
    timeout: Option<u32>,
    priority: Option<Priority>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

#[derive(Serialize)]
pub struct PublishResponse {
    message: String,
    queue: String,
    info: MessageInfo,
}

#[post("/publish")]
async fn publish(
    service: web::Data<Service>,
    req: web::Json<PublishRequest>,
) -> Result<web::Json<PublishResponse>, Error> {
    let req = req.into_inner();

    let message = Message::new(
        req.content,
        req.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
        req.priority.unwrap_or_default(),
        req.metadata,
    )?;

    let outcome = service.dispatcher().publish(&message).await?;

    Ok(web::Json(PublishResponse {
        message: format!("{} message published successfully", outcome.channel),
        queue: outcome.queue,
        info: outcome.info,
    }))
}

#[get("/stats")]
async fn stats(service: web::Data<Service>) -> Result<web::Json<Vec<QueueStatistics>>, Error> {
    Ok(web::Json(service.statistics().await?))
}

#[get("/")]
async fn health() -> impl Responder {
    web::Json(serde_json::json!({ "status": "alive" }))
}

pub fn service() -> Scope {
    web::scope("").service(publish).service(stats).service(health)
}
