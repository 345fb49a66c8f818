use std::cell::RefCell;
use std::fmt;
use std::io;
use std::ops::Deref;
use std::pin::Pin;
use std::rc::Rc;

use futures::io::{AsyncRead as Read, AsyncWrite as Write};
use futures::task::{Context, Poll};
use imap_proto::{MailboxDatum, Response};

use crate::authenticator::Credentials;
use crate::config::Config;
use crate::connection::Connection;
use crate::error::Result;
use crate::extensions::idle::Handle;
use crate::imap_stream::{ChannelTransport, ImapStream};
use crate::listener::Listener;
use crate::parse::{parse_capabilities, parse_expunge, parse_ids};
use crate::types::*;
use crate::utf7;

/// The socket returned by [`connect`]: plain TCP or TLS over TCP.
pub enum ImapConnection {
    /// An unencrypted connection.
    Plain(TcpStream),
    /// A TLS connection.
    Tls(TlsStream<TcpStream>),
}

impl fmt::Debug for ImapConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImapConnection::Plain(s) => f.debug_tuple("Plain").field(s).finish(),
            ImapConnection::Tls(_) => f.write_str("Tls"),
        }
    }
}

impl Read for ImapConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ImapConnection::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ImapConnection::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl Write for ImapConnection {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ImapConnection::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ImapConnection::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ImapConnection::Plain(s) => Pin::new(s).poll_flush(cx),
            ImapConnection::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ImapConnection::Plain(s) => Pin::new(s).poll_close(cx),
            ImapConnection::Tls(s) => Pin::new(s).poll_close(cx),
        }
    }
}

/// Connect to a server, using TLS if `tls` is set.
///
/// The returned [`ImapStream`] has to be run for anything to happen. The connection is ready
/// once [`Connection::greeting`] succeeds.
///
/// ```no_run
/// # fn main() -> async_imap_engine::error::Result<()> {
/// # async_std::task::block_on(async {
/// let (client, stream) = async_imap_engine::connect("imap.example.org", 993, true).await?;
/// let session = async {
///     client.greeting().await?;
///     client.login("me@example.org", "password")?.await?;
///     let boxes = client.list("", "*")?.await?;
///     client.logout()?.await?;
///     Ok::<_, async_imap_engine::error::Error>(boxes)
/// };
/// let (driven, boxes) = futures::join!(stream.run(), session);
/// driven?;
/// for mailbox in boxes? {
///     println!("{}", mailbox.name());
/// }
/// # Ok(())
/// # }) }
/// ```
pub async fn connect<S: AsRef<str>>(
    host: S,
    port: u16,
    tls: bool,
) -> Result<(Client, ImapStream<ImapConnection>)> {
    let host = host.as_ref();
    let tcp = TcpStream::connect((host, port)).await?;
    let stream = if tls {
        let tls = async_native_tls::TlsConnector::new()
            .connect(host, tcp)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        ImapConnection::Tls(tls)
    } else {
        ImapConnection::Plain(tcp)
    };
    log::debug!("connected to {}:{}", host, port);
    Ok(Client::new(stream))
}

/// An IMAP client.
///
/// Every method sends its command right away and returns a future for the result; nothing
/// waits for earlier commands, so several commands may be in flight at once. Methods return
/// `Err` only when the arguments cannot be sent. Server refusals and connection failures are
/// reported by the returned future.
///
/// The client dereferences to its [`Connection`] for lower level access.
#[derive(Debug, Clone)]
pub struct Client {
    connection: Connection,
}

impl Deref for Client {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl Client {
    /// Creates a client over an already established stream, e.g. a TLS stream.
    pub fn new<T: Read + Write + Unpin>(stream: T) -> (Client, ImapStream<T>) {
        Self::with_config(stream, Config::default())
    }

    /// Like [`Client::new`], with explicit configuration.
    pub fn with_config<T: Read + Write + Unpin>(
        stream: T,
        config: Config,
    ) -> (Client, ImapStream<T>) {
        let (transport, outbound) = ChannelTransport::new();
        let connection = Connection::new(transport, config);
        let stream = ImapStream::new(stream, connection.clone(), outbound);
        (Client { connection }, stream)
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Sends a command and collects what `extract` finds in the untagged responses received
    /// while it runs.
    fn collect<T, I, F>(
        &self,
        name: &str,
        args: Vec<Argument>,
        extract: F,
    ) -> Result<Listener<Vec<T>>>
    where
        T: 'static,
        I: IntoIterator<Item = T>,
        F: Fn(&Reply) -> I + 'static,
    {
        let command = self.send_command(name, args)?;
        let found = Rc::new(RefCell::new(Vec::new()));
        let sink = found.clone();
        command.listen(move |reply| sink.borrow_mut().extend(extract(reply)));
        Ok(command.transform(move |_| found.take()))
    }

    /// The [`CAPABILITY` command](https://tools.ietf.org/html/rfc3501#section-6.1.1) returns the
    /// capability names the server supports, upper-cased.
    pub fn capability(&self) -> Result<Listener<Vec<String>>> {
        self.collect("CAPABILITY", vec![], |reply| {
            parse_capabilities(reply).unwrap_or_default()
        })
    }

    /// Does nothing, but gives the server a chance to send status updates.
    pub fn noop(&self) -> Result<Command> {
        self.send_command("NOOP", vec![])
    }

    /// Logs out and closes the connection once the server confirms.
    ///
    /// The server's `BYE` is expected and does not fail anything.
    pub fn logout(&self) -> Result<Command> {
        self.stop();
        let command = self.send_command("LOGOUT", vec![])?;
        let weak = self.connection.downgrade();
        command.callback(move |_| {
            if let Some(connection) = weak.upgrade() {
                connection.close();
            }
        });
        Ok(command)
    }

    /// Authenticate with the server using the given SASL mechanism.
    ///
    /// The mechanism is looked up in the connection's [`Authenticators`]; an unknown name is
    /// reported right away with [`Error::UnknownMechanism`].
    ///
    /// [`Authenticators`]: crate::Authenticators
    /// [`Error::UnknownMechanism`]: crate::error::Error::UnknownMechanism
    pub fn authenticate(&self, mechanism: &str, credentials: &Credentials) -> Result<Command> {
        let authenticator = self.config().authenticators.get(mechanism, credentials)?;
        let command = self.send_command(
            "AUTHENTICATE",
            vec![Argument::raw(mechanism.to_uppercase())],
        )?;
        self.send_authentication_data(authenticator, &command);
        Ok(command)
    }

    /// Log in to the IMAP server with a user name and password.
    pub fn login<U: AsRef<str>, P: AsRef<str>>(&self, username: U, password: P) -> Result<Command> {
        self.send_command(
            "LOGIN",
            vec![username.as_ref().into(), password.as_ref().into()],
        )
    }

    fn mailbox_command(&self, name: &str, mailbox: &str) -> Result<Command> {
        self.send_command(name, vec![utf7::encode(mailbox).into()])
    }

    /// Selects a mailbox. The mailbox state the server reports comes as untagged responses,
    /// which can be observed with [`Listener::listen`] on the returned command.
    pub fn select<S: AsRef<str>>(&self, mailbox_name: S) -> Result<Command> {
        self.mailbox_command("SELECT", mailbox_name.as_ref())
    }

    /// Like [`Client::select`], but opens the mailbox read-only.
    pub fn examine<S: AsRef<str>>(&self, mailbox_name: S) -> Result<Command> {
        self.mailbox_command("EXAMINE", mailbox_name.as_ref())
    }

    /// Creates a mailbox.
    pub fn create<S: AsRef<str>>(&self, mailbox_name: S) -> Result<Command> {
        self.mailbox_command("CREATE", mailbox_name.as_ref())
    }

    /// Permanently removes a mailbox.
    pub fn delete<S: AsRef<str>>(&self, mailbox_name: S) -> Result<Command> {
        self.mailbox_command("DELETE", mailbox_name.as_ref())
    }

    /// Renames a mailbox.
    pub fn rename<S1: AsRef<str>, S2: AsRef<str>>(&self, from: S1, to: S2) -> Result<Command> {
        self.send_command(
            "RENAME",
            vec![
                utf7::encode(from.as_ref()).into(),
                utf7::encode(to.as_ref()).into(),
            ],
        )
    }

    /// Adds a mailbox to the subscribed ones.
    pub fn subscribe<S: AsRef<str>>(&self, mailbox: S) -> Result<Command> {
        self.mailbox_command("SUBSCRIBE", mailbox.as_ref())
    }

    /// Removes a mailbox from the subscribed ones.
    pub fn unsubscribe<S: AsRef<str>>(&self, mailbox: S) -> Result<Command> {
        self.mailbox_command("UNSUBSCRIBE", mailbox.as_ref())
    }

    /// The [`LIST` command](https://tools.ietf.org/html/rfc3501#section-6.3.8) returns the
    /// names matching `pattern` relative to `reference`; `*` and `%` are wildcards.
    pub fn list<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        reference: S1,
        pattern: S2,
    ) -> Result<Listener<Vec<Name>>> {
        self.collect(
            "LIST",
            vec![
                utf7::encode(reference.as_ref()).into(),
                utf7::encode(pattern.as_ref()).into(),
            ],
            |reply| Name::from_mailbox_data(reply),
        )
    }

    /// Like [`Client::list`], restricted to subscribed mailboxes.
    pub fn lsub<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        reference: S1,
        pattern: S2,
    ) -> Result<Listener<Vec<Name>>> {
        self.collect(
            "LSUB",
            vec![
                utf7::encode(reference.as_ref()).into(),
                utf7::encode(pattern.as_ref()).into(),
            ],
            |reply| Name::from_mailbox_data(reply),
        )
    }

    /// The [`STATUS` command](https://tools.ietf.org/html/rfc3501#section-6.3.10) asks for the
    /// given data items of a mailbox, e.g. `(MESSAGES UNSEEN)`, without selecting it.
    pub fn status<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        mailbox_name: S1,
        data_items: S2,
    ) -> Result<Listener<Option<Reply>>> {
        let replies = self.collect(
            "STATUS",
            vec![
                utf7::encode(mailbox_name.as_ref()).into(),
                Argument::raw(data_items.as_ref()),
            ],
            |reply| match reply.parsed() {
                Response::MailboxData(MailboxDatum::Status { .. }) => Some(reply.clone()),
                _ => None,
            },
        )?;
        Ok(replies.transform(|found| found.last().cloned()))
    }

    /// Appends a message to a mailbox. The message is always sent as a literal.
    pub fn append<S: AsRef<str>, B: Into<Vec<u8>>>(
        &self,
        mailbox: S,
        message: B,
        flags: Vec<Argument>,
        date: Option<FixedOffsetDateTime>,
    ) -> Result<Command> {
        let mut args = vec![utf7::encode(mailbox.as_ref()).into()];
        if !flags.is_empty() {
            args.push(Argument::List(flags));
        }
        if let Some(date) = date {
            args.push(date.into());
        }
        args.push(Argument::literal(message));
        self.send_command("APPEND", args)
    }

    /// Requests a checkpoint of the selected mailbox.
    pub fn check(&self) -> Result<Command> {
        self.send_command("CHECK", vec![])
    }

    /// Closes the selected mailbox, expunging deleted messages without reporting them.
    ///
    /// This is the IMAP `CLOSE` command; [`Connection::close`] closes the transport.
    pub fn close(&self) -> Result<Command> {
        self.send_command("CLOSE", vec![])
    }

    /// Permanently removes messages flagged `\Deleted` and returns their sequence numbers.
    pub fn expunge(&self) -> Result<Listener<Vec<Seq>>> {
        self.collect("EXPUNGE", vec![], |reply| parse_expunge(reply))
    }

    /// Searches the selected mailbox, e.g. with `"UNSEEN SINCE 1-Feb-1994"`.
    pub fn search<S: AsRef<str>>(&self, query: S) -> Result<Listener<Vec<Seq>>> {
        self.collect("SEARCH", vec![Argument::raw(query.as_ref())], |reply| {
            parse_ids(reply).unwrap_or_default()
        })
    }

    /// Like [`Client::search`], returning UIDs.
    pub fn uid_search<S: AsRef<str>>(&self, query: S) -> Result<Listener<Vec<Uid>>> {
        self.collect("UID SEARCH", vec![Argument::raw(query.as_ref())], |reply| {
            parse_ids(reply).unwrap_or_default()
        })
    }

    fn fetch_like(&self, name: &str, sequence_set: &str, query: &str) -> Result<Listener<Vec<Reply>>> {
        self.collect(
            name,
            vec![Argument::raw(sequence_set), Argument::raw(query)],
            |reply| match reply.parsed() {
                Response::Fetch(..) => Some(reply.clone()),
                _ => None,
            },
        )
    }

    /// Fetches data for the messages in `sequence_set`, e.g. `fetch("1:4", "(FLAGS RFC822.SIZE)")`.
    pub fn fetch<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        sequence_set: S1,
        query: S2,
    ) -> Result<Listener<Vec<Reply>>> {
        self.fetch_like("FETCH", sequence_set.as_ref(), query.as_ref())
    }

    /// Like [`Client::fetch`], addressing messages by UID.
    pub fn uid_fetch<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        uid_set: S1,
        query: S2,
    ) -> Result<Listener<Vec<Reply>>> {
        self.fetch_like("UID FETCH", uid_set.as_ref(), query.as_ref())
    }

    /// Alters message flags, e.g. `store("1:3", "+FLAGS (\\Deleted)")`, returning the `FETCH`
    /// responses that report the new flags.
    pub fn store<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        sequence_set: S1,
        query: S2,
    ) -> Result<Listener<Vec<Reply>>> {
        self.fetch_like("STORE", sequence_set.as_ref(), query.as_ref())
    }

    /// Like [`Client::store`], addressing messages by UID.
    pub fn uid_store<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        uid_set: S1,
        query: S2,
    ) -> Result<Listener<Vec<Reply>>> {
        self.fetch_like("UID STORE", uid_set.as_ref(), query.as_ref())
    }

    /// Copies messages to the end of another mailbox.
    pub fn copy<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        sequence_set: S1,
        mailbox_name: S2,
    ) -> Result<Command> {
        self.send_command(
            "COPY",
            vec![
                Argument::raw(sequence_set.as_ref()),
                utf7::encode(mailbox_name.as_ref()).into(),
            ],
        )
    }

    /// Like [`Client::copy`], addressing messages by UID.
    pub fn uid_copy<S1: AsRef<str>, S2: AsRef<str>>(
        &self,
        uid_set: S1,
        mailbox_name: S2,
    ) -> Result<Command> {
        self.send_command(
            "UID COPY",
            vec![
                Argument::raw(uid_set.as_ref()),
                utf7::encode(mailbox_name.as_ref()).into(),
            ],
        )
    }

    /// Starts an [`IDLE`](https://tools.ietf.org/html/rfc2177) session on the selected mailbox.
    pub fn idle(&self) -> Result<Handle> {
        Handle::new(&self.connection)
    }
}
