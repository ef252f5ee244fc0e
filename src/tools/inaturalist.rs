//! Biodiversity tools backed by the iNaturalist REST API.
//!
//! Searches are centred on Colombia: observations use a 500 km radius around
//! the country's centre and places use its bounding box. HTTP failures do not
//! fail the tool call; they come back as `{"error": "..."}` payloads.
//!
//! The payload shaping below is plain JSON work and always compiled. The HTTP
//! client and the tool registration need the `inaturalist` feature.

use serde_json::{json, Value};

/// Base URL of the iNaturalist API
pub const BASE_URL: &str = "https://api.inaturalist.org/v1";

/// HTTP timeout for every iNaturalist request, in seconds
pub const TIMEOUT_SECONDS: u64 = 30;

/// Latitude of the search centre
pub const CENTER_LAT: f64 = 4.5709;
/// Longitude of the search centre
pub const CENTER_LNG: f64 = -74.2973;
/// Search radius in kilometres
pub const RADIUS_KM: u32 = 500;

/// Largest page the API serves
pub const MAX_PER_PAGE: u64 = 200;

/// Locale for common names
pub const LOCALE: &str = "es";

/// Bounding box of Colombia as `(nelat, nelng, swlat, swlng)`
pub const COLOMBIA_BBOX: (f64, f64, f64, f64) = (13.4, -66.9, -4.2, -81.7);

const OBSERVATION_URL: &str = "https://www.inaturalist.org/observations";

/// Query parameters as sent on the wire
pub type Query = Vec<(&'static str, String)>;

fn around_center() -> Query {
    vec![
        ("lat", CENTER_LAT.to_string()),
        ("lng", CENTER_LNG.to_string()),
        ("radius", RADIUS_KM.to_string()),
    ]
}

/// Query for `search-observations`
pub fn observations_query(taxon_name: Option<&str>, per_page: u64, order_by: &str) -> Query {
    let mut query = around_center();
    query.push(("per_page", per_page.min(MAX_PER_PAGE).to_string()));
    query.push(("order_by", order_by.to_string()));
    if let Some(taxon) = taxon_name.filter(|t| !t.is_empty()) {
        query.push(("taxon_name", taxon.to_string()));
    }
    query
}

/// Query for `search-species`
pub fn species_query(name: &str, rank: Option<&str>, is_active: bool) -> Query {
    let mut query = vec![
        ("q", name.to_string()),
        ("is_active", is_active.to_string()),
        ("locale", LOCALE.to_string()),
    ];
    if let Some(rank) = rank.filter(|r| !r.is_empty()) {
        query.push(("rank", rank.to_string()));
    }
    query
}

/// Query for `colombia-places`
pub fn places_query(place_name: Option<&str>) -> Query {
    let (nelat, nelng, swlat, swlng) = COLOMBIA_BBOX;
    let mut query = vec![
        ("nelat", nelat.to_string()),
        ("nelng", nelng.to_string()),
        ("swlat", swlat.to_string()),
        ("swlng", swlng.to_string()),
    ];
    if let Some(name) = place_name.filter(|n| !n.is_empty()) {
        query.push(("q", name.to_string()));
    }
    query
}

/// Query for `observations-by-user`
pub fn user_observations_query(username: &str, per_page: u64) -> Query {
    let mut query = vec![("user_login", username.to_string())];
    query.extend(around_center());
    query.push(("per_page", per_page.min(MAX_PER_PAGE).to_string()));
    query
}

fn results(data: &Value) -> &[Value] {
    data.get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn observation_url(observation: &Value) -> Value {
    match observation.get("id") {
        Some(id) if !id.is_null() => json!(format!("{}/{}", OBSERVATION_URL, id)),
        _ => Value::Null,
    }
}

/// Shapes an `/observations` response
pub fn summarize_observations(data: &Value) -> Value {
    let observations: Vec<Value> = results(data)
        .iter()
        .map(|obs| {
            let species = match &obs["species_guess"] {
                Value::Null => json!("Unidentified"),
                guess => guess.clone(),
            };
            json!({
                "id": obs["id"],
                "species": species,
                "scientific_name": obs["taxon"]["name"],
                "observed_on": obs["observed_on_string"],
                "place": obs["place_guess"],
                "user": obs["user"]["login"],
                "photo_url": obs["photos"][0]["url"],
                "url": observation_url(obs),
            })
        })
        .collect();

    json!({
        "total": data["total_results"],
        "observations": observations,
    })
}

/// Shapes a `/taxa` response
pub fn summarize_species(data: &Value) -> Value {
    let species: Vec<Value> = results(data)
        .iter()
        .map(|taxon| {
            json!({
                "id": taxon["id"],
                "scientific_name": taxon["name"],
                "common_name": taxon["preferred_common_name"],
                "rank": taxon["rank"],
                "wikipedia_url": taxon["wikipedia_url"],
                "observations_count": taxon["observations_count"],
                "photo_url": taxon["default_photo"]["medium_url"],
                "conservation_status": taxon["conservation_status"]["status"],
            })
        })
        .collect();

    json!({
        "total": data["total_results"],
        "species": species,
    })
}

/// Shapes a `/places` response
pub fn summarize_places(data: &Value) -> Value {
    let places: Vec<Value> = results(data)
        .iter()
        .map(|place| {
            json!({
                "id": place["id"],
                "name": place["display_name"],
                "type": place["place_type_name"],
                "bbox": place["bounding_box_geojson"],
            })
        })
        .collect();

    json!({
        "total": data["total_results"],
        "places": places,
    })
}

/// Shapes an `/observations` response filtered by user
pub fn summarize_user_observations(username: &str, data: &Value) -> Value {
    let observations: Vec<Value> = results(data)
        .iter()
        .map(|obs| {
            json!({
                "id": obs["id"],
                "species": obs["species_guess"],
                "observed_on": obs["observed_on_string"],
                "place": obs["place_guess"],
                "url": observation_url(obs),
            })
        })
        .collect();

    json!({
        "user": username,
        "total_observations": data["total_results"],
        "observations": observations,
    })
}

/// Combines the observation and species-count totals
pub fn summarize_statistics(observations: &Value, species_counts: &Value) -> Value {
    json!({
        "total_observations": observations.get("total_results").cloned().unwrap_or_else(|| json!(0)),
        "total_species": species_counts.get("total_results").cloned().unwrap_or_else(|| json!(0)),
        "region": "Colombia (central region)",
    })
}

/// The `{"error": ...}` payload returned for failed lookups
pub fn error_payload(context: &str, error: impl std::fmt::Display) -> Value {
    json!({ "error": format!("{}: {}", context, error) })
}

#[cfg(feature = "inaturalist")]
pub use client::{register_inaturalist_tools, InaturalistClient};

#[cfg(feature = "inaturalist")]
mod client {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use reqwest::Client;
    use serde_json::{json, Value};
    use tracing::{debug, instrument, warn};

    use super::*;
    use crate::mcp::tools::{InputSchema, ParamSpec, ParamType, Tool, ToolArguments, ToolRegistry};
    use crate::telemetry::add_metric;
    use crate::utils::error::{McpError, McpResult};

    /// HTTP client for the iNaturalist API
    #[derive(Debug, Clone)]
    pub struct InaturalistClient {
        base_url: String,
        client: Client,
    }

    impl InaturalistClient {
        /// Client for the public API
        pub fn new() -> McpResult<Self> {
            Self::with_base_url(BASE_URL)
        }

        /// Client for another deployment of the API
        pub fn with_base_url(base_url: &str) -> McpResult<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(TIMEOUT_SECONDS))
                .build()
                .map_err(|e| McpError::Config(format!("Failed to create HTTP client: {}", e)))?;
            Ok(Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                client,
            })
        }

        #[instrument(skip(self, query))]
        async fn get(&self, path: &str, query: &Query) -> Result<Value, String> {
            let url = format!("{}{}", self.base_url, path);
            debug!("GET {}", url);
            let start = Instant::now();

            let response = self.client.get(&url).query(query).send().await.map_err(|e| {
                if e.is_timeout() {
                    "timed out waiting for iNaturalist".to_string()
                } else {
                    e.to_string()
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("iNaturalist returned {}: {}", status, body);
                return Err(format!("HTTP {}: {}", status.as_u16(), body));
            }

            let data = response.json::<Value>().await.map_err(|e| e.to_string())?;
            add_metric(
                "inaturalist_request_duration_ms",
                start.elapsed().as_millis() as f64,
                &[("path", path.to_string())],
            );
            Ok(data)
        }

        /// Recent observations, optionally of one taxon
        pub async fn search_observations(&self, args: &ToolArguments) -> Value {
            let query = observations_query(
                args.get("taxon_name").and_then(Value::as_str),
                args.get("per_page").and_then(Value::as_u64).unwrap_or(10),
                args.get("order_by")
                    .and_then(Value::as_str)
                    .unwrap_or("created_at"),
            );
            match self.get("/observations", &query).await {
                Ok(data) => summarize_observations(&data),
                Err(e) => error_payload("failed to search observations", e),
            }
        }

        /// Taxa matching a common or scientific name
        pub async fn search_species(&self, args: &ToolArguments) -> Value {
            let query = species_query(
                args.get("name").and_then(Value::as_str).unwrap_or_default(),
                args.get("rank").and_then(Value::as_str),
                args.get("is_active").and_then(Value::as_bool).unwrap_or(true),
            );
            match self.get("/taxa", &query).await {
                Ok(data) => summarize_species(&data),
                Err(e) => error_payload("failed to search species", e),
            }
        }

        /// Places inside Colombia's bounding box
        pub async fn colombia_places(&self, args: &ToolArguments) -> Value {
            let query = places_query(args.get("place_name").and_then(Value::as_str));
            match self.get("/places", &query).await {
                Ok(data) => summarize_places(&data),
                Err(e) => error_payload("failed to fetch places", e),
            }
        }

        /// Observation and species totals around the centre of Colombia
        pub async fn biodiversity_statistics(&self) -> Value {
            let mut observations = around_center();
            observations.push(("per_page", "1".to_string()));
            observations.push(("only_id", "true".to_string()));
            let mut species = around_center();
            species.push(("per_page", "1".to_string()));

            let totals = async {
                let obs = self.get("/observations", &observations).await?;
                let counts = self.get("/observations/species_counts", &species).await?;
                Ok::<_, String>(summarize_statistics(&obs, &counts))
            };
            match totals.await {
                Ok(summary) => summary,
                Err(e) => error_payload("failed to fetch statistics", e),
            }
        }

        /// Observations made by one user
        pub async fn observations_by_user(&self, args: &ToolArguments) -> Value {
            let username = args
                .get("username")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let query = user_observations_query(
                username,
                args.get("per_page").and_then(Value::as_u64).unwrap_or(10),
            );
            match self.get("/observations", &query).await {
                Ok(data) => summarize_user_observations(username, &data),
                Err(e) => error_payload("failed to fetch user observations", e),
            }
        }
    }

    fn optional(param_type: ParamType, default: Option<Value>, description: &str) -> ParamSpec {
        ParamSpec::optional(param_type, default).describe(description)
    }

    /// Adds the iNaturalist tools to `registry`
    pub fn register_inaturalist_tools(registry: &mut ToolRegistry) -> McpResult<()> {
        let client = Arc::new(InaturalistClient::new()?);

        let c = client.clone();
        registry.register_async(
            Tool::new(
                "search-observations",
                "Searches recent iNaturalist observations in Colombia",
                InputSchema::new()
                    .param("taxon_name", optional(ParamType::String, None, "Taxon name (species, genus, family...)"))
                    .param("per_page", optional(ParamType::Integer, Some(json!(10)), "Number of results (max 200)"))
                    .param(
                        "order_by",
                        optional(
                            ParamType::String,
                            Some(json!("created_at")),
                            "created_at, observed_on, species_guess or votes",
                        ),
                    ),
            ),
            move |args| {
                let c = c.clone();
                async move { Ok(c.search_observations(&args).await) }
            },
        )?;

        let c = client.clone();
        registry.register_async(
            Tool::new(
                "search-species",
                "Looks up species and other taxa by name",
                InputSchema::new()
                    .param(
                        "name",
                        ParamSpec::required(ParamType::String).describe("Common or scientific name"),
                    )
                    .param("rank", optional(ParamType::String, None, "Taxonomic rank"))
                    .param(
                        "is_active",
                        optional(ParamType::Boolean, Some(json!(true)), "Only active taxa"),
                    ),
            ),
            move |args| {
                let c = c.clone();
                async move { Ok(c.search_species(&args).await) }
            },
        )?;

        let c = client.clone();
        registry.register_async(
            Tool::new(
                "colombia-places",
                "Lists places inside Colombia",
                InputSchema::new().param(
                    "place_name",
                    optional(ParamType::String, None, "Department or place to search for"),
                ),
            ),
            move |args| {
                let c = c.clone();
                async move { Ok(c.colombia_places(&args).await) }
            },
        )?;

        let c = client.clone();
        registry.register_async(
            Tool::new(
                "biodiversity-statistics",
                "Observation and species totals for Colombia",
                InputSchema::new(),
            ),
            move |_| {
                let c = c.clone();
                async move { Ok(c.biodiversity_statistics().await) }
            },
        )?;

        let c = client;
        registry.register_async(
            Tool::new(
                "observations-by-user",
                "Observations made in Colombia by one iNaturalist user",
                InputSchema::new()
                    .param(
                        "username",
                        ParamSpec::required(ParamType::String).describe("iNaturalist login"),
                    )
                    .param("per_page", optional(ParamType::Integer, Some(json!(10)), "Number of results")),
            ),
            move |args| {
                let c = c.clone();
                async move { Ok(c.observations_by_user(&args).await) }
            },
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of<'a>(query: &'a Query, key: &str) -> Option<&'a str> {
        query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn observation_queries_are_centred_and_capped() {
        let query = observations_query(Some("Ara macao"), 500, "votes");
        assert_eq!(value_of(&query, "lat"), Some("4.5709"));
        assert_eq!(value_of(&query, "lng"), Some("-74.2973"));
        assert_eq!(value_of(&query, "radius"), Some("500"));
        assert_eq!(value_of(&query, "per_page"), Some("200"));
        assert_eq!(value_of(&query, "taxon_name"), Some("Ara macao"));

        assert_eq!(value_of(&observations_query(None, 10, "created_at"), "taxon_name"), None);
    }

    #[test]
    fn species_and_place_queries() {
        let query = species_query("colibri", Some("species"), true);
        assert_eq!(value_of(&query, "locale"), Some("es"));
        assert_eq!(value_of(&query, "is_active"), Some("true"));
        assert_eq!(value_of(&query, "rank"), Some("species"));

        let places = places_query(None);
        assert_eq!(value_of(&places, "nelat"), Some("13.4"));
        assert_eq!(value_of(&places, "swlng"), Some("-81.7"));
        assert_eq!(value_of(&places, "q"), None);
    }

    #[test]
    fn observations_are_summarized() {
        let data = json!({
            "total_results": 2,
            "results": [
                {
                    "id": 7,
                    "species_guess": "Guacamaya",
                    "taxon": {"name": "Ara macao"},
                    "observed_on_string": "2024-01-02",
                    "place_guess": "Leticia",
                    "user": {"login": "ana"},
                    "photos": [{"url": "https://img/7.jpg"}]
                },
                {"id": 8}
            ]
        });

        let summary = summarize_observations(&data);
        assert_eq!(summary["total"], json!(2));
        let first = &summary["observations"][0];
        assert_eq!(first["scientific_name"], json!("Ara macao"));
        assert_eq!(first["photo_url"], json!("https://img/7.jpg"));
        assert_eq!(first["url"], json!("https://www.inaturalist.org/observations/7"));

        let second = &summary["observations"][1];
        assert_eq!(second["species"], json!("Unidentified"));
        assert_eq!(second["photo_url"], Value::Null);
    }

    #[test]
    fn missing_results_yield_empty_lists() {
        assert_eq!(summarize_species(&json!({}))["species"], json!([]));
        assert_eq!(summarize_places(&json!({"results": null}))["places"], json!([]));
        let user = summarize_user_observations("ana", &json!({"total_results": 0, "results": []}));
        assert_eq!(user["user"], json!("ana"));
        assert_eq!(user["total_observations"], json!(0));
    }

    #[test]
    fn statistics_default_to_zero() {
        let stats = summarize_statistics(&json!({"total_results": 120}), &json!({}));
        assert_eq!(stats["total_observations"], json!(120));
        assert_eq!(stats["total_species"], json!(0));
    }

    #[test]
    fn errors_are_payloads() {
        assert_eq!(
            error_payload("failed to fetch places", "HTTP 500: boom"),
            json!({"error": "failed to fetch places: HTTP 500: boom"})
        );
    }
}
