use crate::config::RunMode;

pub const ALLOWED_ORIGINS: [&str; 2] = [
    "https://nicolasacquaviva.com",
    "https://www.nicolasacquaviva.com",
];

pub fn allow(request_origin: &str, production: bool) -> bool {
    if !production {
        return true;
    }
    ALLOWED_ORIGINS.contains(&request_origin)
}

/// Upgrade gate fixed at startup from the run mode.
#[derive(Clone, Copy, Debug)]
pub struct OriginPolicy {
    production: bool,
}

impl OriginPolicy {
    pub fn for_mode(mode: RunMode) -> Self {
        Self {
            production: mode.is_production(),
        }
    }

    /// A missing header is judged as an empty origin.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        allow(origin.unwrap_or(""), self.production)
    }
}
