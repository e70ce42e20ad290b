use log::{debug, info, warn};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};

/// Logs each request line and the status it was answered with.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        match req.content_type() {
            Some(ct) => debug!("{} {} ({})", req.method(), req.uri(), ct),
            None => debug!("{} {}", req.method(), req.uri()),
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let status = res.status();
        if status.code >= 500 {
            warn!("{} {} => {}", req.method(), req.uri(), status);
        } else {
            info!("{} {} => {}", req.method(), req.uri(), status);
        }
    }
}
