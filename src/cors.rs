use crate::auth::identity::USER_ID_HEADER;
use crate::settings::{CorsSettings, DEFAULT_CORS_MAX_AGE};
use log::debug;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::{routes, Request, Response, Route};

const ANY_ORIGIN: &str = "*";

/// How a request origin was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginMatch {
    /// Named in the allow list; credentials may be shared.
    Listed,
    /// Admitted only through `*`.
    Any,
}

/// Adds CORS headers for the configured browser origins.
pub struct Cors {
    allowed_origins: Vec<String>,
    max_age: u64,
}

impl Cors {
    pub fn new(settings: &CorsSettings) -> Self {
        Self {
            allowed_origins: settings
                .allowed_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_string())
                .collect(),
            max_age: settings.max_age.unwrap_or(DEFAULT_CORS_MAX_AGE),
        }
    }

    pub fn origin_match(&self, origin: &str) -> Option<OriginMatch> {
        let origin = origin.trim_end_matches('/');
        if self.allowed_origins.iter().any(|o| o.eq_ignore_ascii_case(origin)) {
            Some(OriginMatch::Listed)
        } else if self.allowed_origins.iter().any(|o| o == ANY_ORIGIN) {
            Some(OriginMatch::Any)
        } else {
            None
        }
    }
}

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let Some(origin) = req.headers().get_one("Origin") else {
            return;
        };
        let Some(matched) = self.origin_match(origin) else {
            debug!("Origin {} not allowed", origin);
            return;
        };
        match matched {
            OriginMatch::Listed => {
                res.set_header(Header::new(
                    "Access-Control-Allow-Origin",
                    origin.to_string(),
                ));
                res.set_header(Header::new("Vary", "Origin"));
                res.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
            }
            OriginMatch::Any => {
                res.set_header(Header::new("Access-Control-Allow-Origin", ANY_ORIGIN));
            }
        }
        res.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, HEAD, POST, PUT, DELETE, OPTIONS",
        ));
        res.set_header(Header::new(
            "Access-Control-Allow-Headers",
            format!("Content-Type, Authorization, Range, {}", USER_ID_HEADER),
        ));
        res.set_header(Header::new(
            "Access-Control-Expose-Headers",
            "Content-Range, Accept-Ranges",
        ));
        res.set_header(Header::new(
            "Access-Control-Max-Age",
            self.max_age.to_string(),
        ));
    }
}

/// Answers every preflight request; the fairing adds the headers.
#[rocket::options("/<_..>")]
fn preflight() -> Status {
    Status::NoContent
}

pub fn preflight_routes() -> Vec<Route> {
    routes![preflight]
}
