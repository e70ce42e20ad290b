use log::{debug, warn};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::{async_trait, Request};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "userid";

/// Caller identity taken from the `userid` header.
///
/// The header is trusted as-is; there is no session or token behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

pub fn parse_user_id(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

#[async_trait]
impl<'r> FromRequest<'r> for UserId {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.headers().get_one(USER_ID_HEADER) {
            Some(value) => match parse_user_id(value) {
                Some(id) => {
                    debug!("Request identified as user {}", id);
                    Outcome::Success(UserId(id))
                }
                None => {
                    warn!("Invalid userid header: {:?}", value);
                    Outcome::Error((Status::BadRequest, "Invalid userid header"))
                }
            },
            None => {
                warn!(
                    "userid header not found for {} {}",
                    request.method(),
                    request.uri()
                );
                Outcome::Error((Status::Unauthorized, "userid header not found"))
            }
        }
    }
}
