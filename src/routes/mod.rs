use crate::db::{Database, User};
use crate::error::{ApiError, ServiceError, ServiceResult};
use crate::storage::{HttpRange, MediaName, StorageBackend};
use http_range_header::{parse_range_header, EndPosition, StartPosition};
use log::{error, warn};
use rocket::http::{ContentType, Header, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::response::{self, Responder};
use rocket::{async_trait, catch, catchers, routes, Catcher, Request, Response, Route, State};
use std::sync::Arc;

mod comments;
mod discussions;
mod groups;
mod likes;
mod messages;
mod posts;
mod recipes;
mod users;

pub use comments::comment_routes;
pub use discussions::discussion_routes;
pub use groups::group_routes;
pub use likes::like_routes;
pub use messages::message_routes;
pub use posts::post_routes;
pub use recipes::recipe_routes;
pub use users::user_routes;

// Define a custom responder that wraps Response
pub struct CustomResponse(Response<'static>);

impl<'r, 'o: 'r> Responder<'r, 'o> for CustomResponse {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        Ok(self.0)
    }
}

pub struct RangeHeader(pub Option<String>);

#[async_trait]
impl<'r> FromRequest<'r> for RangeHeader {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let range = request.headers().get_one("Range").map(|v| v.to_string());
        Outcome::Success(RangeHeader(range))
    }
}

/// Widths of the bounded text columns.
pub(crate) const MAX_NAME_LENGTH: usize = 255;
pub(crate) const MAX_CUISINE_LENGTH: usize = 100;
pub(crate) const MAX_URL_LENGTH: usize = 1024;

/// Loads the user or fails with 404.
pub(crate) async fn require_user(db: &Database, id: i64) -> ServiceResult<User> {
    db.get_user(id).await?.ok_or(ServiceError::NotFound("User"))
}

pub(crate) async fn require_post(db: &Database, id: i64) -> ServiceResult<()> {
    if db.post_exists(id).await? {
        Ok(())
    } else {
        Err(ServiceError::NotFound("Post"))
    }
}

/// Trimmed value, or 400 naming the field when it is blank.
pub(crate) fn required<'a>(value: &'a str, field: &str) -> ServiceResult<&'a str> {
    let v = value.trim();
    if v.is_empty() {
        Err(ServiceError::bad_request(format!("{} is required", field)))
    } else {
        Ok(v)
    }
}

/// 400 when `value` has more than `max` characters.
pub(crate) fn check_length(value: &str, field: &str, max: usize) -> ServiceResult<()> {
    if value.chars().count() > max {
        Err(ServiceError::bad_request(format!(
            "{} must be at most {} characters",
            field, max
        )))
    } else {
        Ok(())
    }
}

fn parse_media_name(name: &str) -> Result<MediaName, ApiError> {
    MediaName::parse(name).ok_or_else(|| {
        warn!("Invalid media name: {}", name);
        ApiError::new(Status::BadRequest, "Invalid media name")
    })
}

fn media_content_type(name: &MediaName) -> ContentType {
    name.extension
        .as_deref()
        .and_then(ContentType::from_extension)
        .unwrap_or(ContentType::Binary)
}

/// Single byte range from a `Range` header, clipped to `file_size`.
///
/// Unparseable or unsatisfiable ranges yield `None` and the whole file is sent.
fn parse_and_validate_range(range_header_val: Option<String>, file_size: u64) -> Option<HttpRange> {
    if file_size == 0 {
        return None;
    }
    let header = range_header_val?;
    let parsed = match parse_range_header(&header) {
        Ok(p) => p,
        Err(e) => {
            warn!("Failed to parse Range header '{}': {}", header, e);
            return None;
        }
    };
    // only the first range specifier is honoured
    let range = parsed.ranges.first()?;
    let last = file_size - 1;

    let (start, end) = match (range.start, range.end) {
        (StartPosition::Index(start), EndPosition::Index(end)) => (start, end.min(last)),
        (StartPosition::Index(start), EndPosition::LastByte) => (start, last),
        (StartPosition::FromLast(0), _) => {
            warn!("Invalid suffix range: suffix=0");
            return None;
        }
        (StartPosition::FromLast(suffix), _) => (file_size.saturating_sub(suffix), last),
    };

    if start > end {
        warn!(
            "Range unsatisfiable: start={}, end={}, file_size={}",
            start, end, file_size
        );
        return None;
    }
    Some(HttpRange { start, end })
}

#[rocket::get("/media/<name>")]
pub async fn get_media(
    name: &str,
    range_header: RangeHeader,
    storage: &State<Arc<dyn StorageBackend>>,
) -> Result<CustomResponse, ApiError> {
    let media = parse_media_name(name)?;
    let meta = storage
        .head(&media.id)
        .await
        .map_err(|_| ServiceError::NotFound("Media"))?;

    let range = parse_and_validate_range(range_header.0, meta.size);
    let stream = storage.stream_reader(&media.id, range).await.map_err(|e| {
        error!("Failed to stream media {}: {}", name, e);
        ApiError::new(Status::InternalServerError, "Failed to read media")
    })?;

    let mut response = Response::build();
    response
        .header(media_content_type(&media))
        .header(Header::new("Accept-Ranges", "bytes"));
    match range {
        Some(HttpRange { start, end }) => {
            response.status(Status::PartialContent).header(Header::new(
                "Content-Range",
                format!("bytes {}-{}/{}", start, end, meta.size),
            ));
        }
        None => {
            response.status(Status::Ok);
        }
    }
    Ok(CustomResponse(response.streamed_body(stream).finalize()))
}

#[rocket::head("/media/<name>")]
pub async fn head_media(
    name: &str,
    storage: &State<Arc<dyn StorageBackend>>,
) -> Result<CustomResponse, ApiError> {
    let media = parse_media_name(name)?;
    let meta = storage
        .head(&media.id)
        .await
        .map_err(|_| ServiceError::NotFound("Media"))?;

    Ok(CustomResponse(
        Response::build()
            .status(Status::Ok)
            .header(media_content_type(&media))
            .header(Header::new("Content-Length", meta.size.to_string()))
            .header(Header::new("Accept-Ranges", "bytes"))
            .finalize(),
    ))
}

#[rocket::get("/health")]
pub async fn health_check() -> &'static str {
    "OK"
}

pub fn media_routes() -> Vec<Route> {
    routes![get_media, head_media, health_check]
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> ApiError {
    let message = match status.code {
        401 => "userid header not found",
        404 => "Resource not found",
        422 => "Malformed request",
        _ => status.reason().unwrap_or("Request failed"),
    };
    ApiError::new(status, message)
}

/// Turns every unhandled error status into the JSON error body.
pub fn api_catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(header: &str, size: u64) -> Option<(u64, u64)> {
        parse_and_validate_range(Some(header.to_string()), size)
            .map(|r| (r.start, r.end))
    }

    #[test]
    fn video_seek_ranges() {
        // a 4 MB cooking clip
        let size = 4_000_000;
        assert_eq!(range("bytes=0-65535", size), Some((0, 65535)));
        assert_eq!(range("bytes=3999000-", size), Some((3_999_000, 3_999_999)));
        assert_eq!(range("bytes=-500", size), Some((3_999_500, 3_999_999)));
        assert_eq!(range("bytes=-5000000", size), Some((0, 3_999_999)));
        // end past the file is clipped
        assert_eq!(range("bytes=2000000-9000000", size), Some((2_000_000, 3_999_999)));
        assert_eq!(
            parse_and_validate_range(Some("bytes=10-19".to_string()), size).map(|r| r.size()),
            Some(10)
        );
    }

    #[test]
    fn rejects_unsatisfiable_ranges() {
        assert_eq!(range("bytes=20-", 10), None);
        assert_eq!(range("bytes=-0", 10), None);
        assert_eq!(range("pages=1-2", 10), None);
        assert_eq!(range("bytes=0-5", 0), None);
        assert_eq!(parse_and_validate_range(None, 10), None);
    }

    #[test]
    fn content_type_from_extension() {
        let hash = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        let png = MediaName::parse(&format!("{}.png", hash)).unwrap();
        assert_eq!(media_content_type(&png), ContentType::PNG);
        let bare = MediaName::parse(hash).unwrap();
        assert_eq!(media_content_type(&bare), ContentType::Binary);
    }

    #[test]
    fn required_fields() {
        assert_eq!(required("  Tacos ", "name").unwrap(), "Tacos");
        assert!(matches!(
            required("   ", "name"),
            Err(ServiceError::BadRequest(m)) if m == "name is required"
        ));
        assert!(check_length("abc", "content", 3).is_ok());
        assert!(check_length("abcd", "content", 3).is_err());
    }
}
