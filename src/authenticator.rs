//! SASL mechanisms for the `AUTHENTICATE` command.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use hmac::{Hmac, Mac};

use crate::error::{Error, Result};

/// This trait allows for pluggable authentication schemes. It is used by
/// [`Client::authenticate`](crate::Client::authenticate) to answer the server's challenges.
///
/// The challenge arrives base64-decoded and the answer is base64-encoded before it is sent.
pub trait Authenticator {
    /// Each base64-decoded server challenge is passed to `process`.
    /// The returned bytes are base64-encoded and sent back to the server.
    fn process(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;
}

/// The secret material handed to an authenticator factory.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The user to authenticate as.
    pub user: String,
    /// A password, or an access token for token based mechanisms.
    pub secret: String,
}

impl Credentials {
    /// Credentials for `user`.
    pub fn new<U: Into<String>, S: Into<String>>(user: U, secret: S) -> Self {
        Credentials {
            user: user.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// `LOGIN`: answers the first challenge with the user name and the second with the password.
#[derive(Debug)]
pub struct Login {
    credentials: Credentials,
    step: usize,
}

impl Authenticator for Login {
    fn process(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        self.step += 1;
        match self.step {
            1 => Ok(self.credentials.user.as_bytes().to_vec()),
            2 => Ok(self.credentials.secret.as_bytes().to_vec()),
            _ => Err(Error::Authentication(
                "LOGIN received more than two challenges".into(),
            )),
        }
    }
}

/// `PLAIN` (RFC 4616) with an empty authorization identity.
#[derive(Debug)]
pub struct Plain {
    credentials: Credentials,
}

impl Authenticator for Plain {
    fn process(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        Ok(format!("\0{}\0{}", self.credentials.user, self.credentials.secret).into_bytes())
    }
}

/// `CRAM-MD5` (RFC 2195).
#[derive(Debug)]
pub struct CramMd5 {
    credentials: Credentials,
}

impl Authenticator for CramMd5 {
    fn process(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let mut mac = Hmac::<md5::Md5>::new_from_slice(self.credentials.secret.as_bytes())
            .map_err(|e| Error::Authentication(e.to_string()))?;
        mac.update(challenge);
        let digest: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Ok(format!("{} {}", self.credentials.user, digest).into_bytes())
    }
}

/// `XOAUTH2` as used by Gmail and Outlook; the secret is the OAuth2 access token.
#[derive(Debug)]
pub struct XOAuth2 {
    credentials: Credentials,
}

impl Authenticator for XOAuth2 {
    fn process(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        Ok(format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.credentials.user, self.credentials.secret
        )
        .into_bytes())
    }
}

type Factory = Rc<dyn Fn(&Credentials) -> Box<dyn Authenticator>>;

/// The mechanisms available to [`Client::authenticate`](crate::Client::authenticate), by name.
///
/// The default registry knows `LOGIN`, `PLAIN`, `CRAM-MD5` and `XOAUTH2`. Names are
/// case-insensitive.
#[derive(Clone)]
pub struct Authenticators {
    factories: HashMap<String, Factory>,
}

impl Authenticators {
    /// A registry without any mechanism.
    pub fn empty() -> Self {
        Authenticators {
            factories: HashMap::new(),
        }
    }

    /// Adds a mechanism, replacing any previous one with the same name.
    pub fn register<S, F>(&mut self, mechanism: S, factory: F) -> &mut Self
    where
        S: AsRef<str>,
        F: Fn(&Credentials) -> Box<dyn Authenticator> + 'static,
    {
        self.factories
            .insert(mechanism.as_ref().to_uppercase(), Rc::new(factory));
        self
    }

    /// Creates an authenticator for `mechanism`.
    pub fn get(&self, mechanism: &str, credentials: &Credentials) -> Result<Box<dyn Authenticator>> {
        self.factories
            .get(&mechanism.to_uppercase())
            .map(|factory| factory(credentials))
            .ok_or_else(|| Error::UnknownMechanism(mechanism.to_string()))
    }

    /// The registered mechanism names, sorted.
    pub fn mechanisms(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Authenticators {
    fn default() -> Self {
        let mut registry = Authenticators::empty();
        registry
            .register("LOGIN", |c| {
                Box::new(Login {
                    credentials: c.clone(),
                    step: 0,
                })
            })
            .register("PLAIN", |c| {
                Box::new(Plain {
                    credentials: c.clone(),
                })
            })
            .register("CRAM-MD5", |c| {
                Box::new(CramMd5 {
                    credentials: c.clone(),
                })
            })
            .register("XOAUTH2", |c| {
                Box::new(XOAuth2 {
                    credentials: c.clone(),
                })
            });
        registry
    }
}

impl fmt::Debug for Authenticators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.mechanisms()).finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn run(mechanism: &str, user: &str, secret: &str, challenges: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut auth = Authenticators::default()
            .get(mechanism, &Credentials::new(user, secret))
            .unwrap();
        challenges
            .iter()
            .map(|c| auth.process(c).unwrap())
            .collect()
    }

    #[test]
    fn cram_md5_matches_rfc_2195() {
        let answers = run(
            "CRAM-MD5",
            "tim",
            "tanstaaftanstaaf",
            &[b"<1896.697170952@postoffice.reston.mci.net>"],
        );
        assert_eq!(
            String::from_utf8(answers[0].clone()).unwrap(),
            "tim b913a602c7eda7a495b4e6e7334d3890"
        );
    }

    #[test]
    fn login_sends_user_then_password() {
        let answers = run("login", "joe", "blogs", &[b"Username:", b"Password:"]);
        assert_eq!(answers, vec![b"joe".to_vec(), b"blogs".to_vec()]);

        let mut auth = Authenticators::default()
            .get("LOGIN", &Credentials::new("joe", "blogs"))
            .unwrap();
        auth.process(b"").unwrap();
        auth.process(b"").unwrap();
        assert!(auth.process(b"").is_err());
    }

    #[test]
    fn plain_and_xoauth2() {
        assert_eq!(
            run("PLAIN", "joe", "blogs", &[b""]),
            vec![b"\0joe\0blogs".to_vec()]
        );
        assert_eq!(
            run("XOAUTH2", "joe@example.com", "ya29.token", &[b""]),
            vec![b"user=joe@example.com\x01auth=Bearer ya29.token\x01\x01".to_vec()]
        );
    }

    #[test]
    fn unknown_mechanisms() {
        match Authenticators::default().get("GSSAPI", &Credentials::new("a", "b")) {
            Err(Error::UnknownMechanism(name)) => assert_eq!(name, "GSSAPI"),
            Err(other) => panic!("unexpected: {:?}", other),
            Ok(_) => panic!("GSSAPI is not registered"),
        }
    }

    #[test]
    fn custom_mechanisms() {
        struct Echo;
        impl Authenticator for Echo {
            fn process(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
                Ok(challenge.to_vec())
            }
        }

        let mut registry = Authenticators::empty();
        registry.register("x-echo", |_| Box::new(Echo));
        assert_eq!(registry.mechanisms(), vec!["X-ECHO"]);
        let mut auth = registry.get("X-Echo", &Credentials::new("", "")).unwrap();
        assert_eq!(auth.process(b"ping").unwrap(), b"ping".to_vec());
    }
}
