//! Demonstrates a cart session against a mock API: login, a transparent credential renewal
//! while the cart loads, and an optimistic add that the server later reprices.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
use serde_json::json;
use url::Url;
// self
use session_gateway::{
	config::GatewayConfig, gateway::ReqwestGateway, http::ApiRequest, resource::RemoteResource,
	store::MemoryStore,
};

#[derive(Clone, Debug, Default, Deserialize)]
struct Cart {
	items: Vec<Line>,
	total: u32,
}

#[derive(Clone, Debug, Deserialize)]
struct Line {
	sku: String,
	quantity: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "demo-a1", "refresh_token": "demo-r1" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/cart").header("authorization", "Bearer demo-a1");
			then.status(401);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "demo-a2", "refresh_token": "demo-r2" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/cart").header("authorization", "Bearer demo-a2");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "items": [], "total": 0 }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/cart/items");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "items": [{ "sku": "tea", "quantity": 2 }], "total": 1798 }));
		})
		.await;

	let config = GatewayConfig::builder(Url::parse(&server.base_url())?)
		.allow_insecure_http(true)
		.build()?;
	let gateway = ReqwestGateway::new(config, Arc::new(MemoryStore::default()));
	let mut events = gateway.events.subscribe();

	gateway.login(&json!({ "email": "demo@example.com", "password": "demo" })).await?;

	let cart = RemoteResource::new(gateway.clone(), "/cart", Cart::default());

	cart.load().await?;

	let add_tea = |cart: &Cart| {
		let mut next = cart.clone();

		next.items.push(Line { sku: "tea".into(), quantity: 2 });
		next.total += 2 * 900;

		next
	};
	let request = ApiRequest::post("/cart/items").json(&json!({ "sku": "tea", "quantity": 2 }))?;
	let confirmed = cart.mutate(add_tea, request).await?;

	println!("Confirmed cart: {:?} (total {})", confirmed.items, confirmed.total);

	for line in &confirmed.items {
		println!("- {} x{}", line.sku, line.quantity);
	}
	while let Ok(event) = events.try_recv() {
		println!("Session event: {event:?}");
	}

	println!("Renewals performed: {}", gateway.refresh_metrics().attempts());

	Ok(())
}
