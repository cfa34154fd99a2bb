use std::fmt;

/// Vendor API endpoints. All are `POST` with a JSON body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Logout,
    Connect,
    Disconnect,
    LastSessionId,
    SystemState,
    StateCommand,
    Systems,
}

impl Endpoint {
    pub const ALL: [Endpoint; 8] = [
        Endpoint::Login,
        Endpoint::Logout,
        Endpoint::Connect,
        Endpoint::Disconnect,
        Endpoint::LastSessionId,
        Endpoint::SystemState,
        Endpoint::StateCommand,
        Endpoint::Systems,
    ];

    /// Path below the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Login => "/authenticate/login",
            Endpoint::Logout => "/authenticate/logout",
            Endpoint::Connect => "/authenticate/connect",
            Endpoint::Disconnect => "/authenticate/disconnect",
            Endpoint::LastSessionId => "/authenticate/getLastTtmSessionId",
            Endpoint::SystemState => "/status/getSystemState",
            Endpoint::StateCommand => "/action/stateCommand",
            Endpoint::Systems => "/configuration/getSystems",
        }
    }

    /// Login is the only call made without a bearer token.
    pub fn is_login(&self) -> bool {
        matches!(self, Endpoint::Login)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
