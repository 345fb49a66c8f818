use async_imap_engine::types::TcpStream;
use async_imap_engine::{connect, Client, Config};
use async_std::io::BufReader;
use async_std::net::TcpListener;
use async_std::prelude::*;
use async_std::task;
use pretty_assertions::assert_eq;

/// Serves one connection: writes the greeting, then answers each expected command line with the
/// given response lines. Returns the lines the client sent.
async fn serve(listener: TcpListener, script: Vec<(&'static str, &'static str)>) -> Vec<String> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut writer = stream.clone();
    let mut reader = BufReader::new(stream);
    writer.write_all(b"* OK test server ready\r\n").await.unwrap();

    let mut seen = Vec::new();
    for (expected, answer) in script {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, expected);
        seen.push(line);
        writer.write_all(answer.as_bytes()).await.unwrap();
    }
    seen
}

async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[async_std::test]
async fn capability_and_logout() {
    let (listener, port) = listen().await;
    let server = task::spawn(serve(
        listener,
        vec![
            (
                "A0001 CAPABILITY\r\n",
                "* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN\r\nA0001 OK done\r\n",
            ),
            ("A0002 LOGOUT\r\n", "* BYE bye\r\nA0002 OK logged out\r\n"),
        ],
    ));

    let (client, stream) = connect("127.0.0.1", port, false).await.unwrap();
    let session = async {
        let greeting = client.greeting().await?;
        assert_eq!(greeting.information(), "test server ready");
        let caps = client.capability()?.await?;
        client.logout()?.await?;
        client.session().await?;
        Ok::<_, async_imap_engine::error::Error>(caps)
    };
    let (driven, caps) = futures::join!(stream.run(), session);

    driven.unwrap();
    assert_eq!(caps.unwrap(), vec!["IMAP4REV1", "IDLE", "AUTH=PLAIN"]);
    assert_eq!(server.await.len(), 2);
}

#[async_std::test]
async fn pipelined_commands_with_a_custom_prefix() {
    let (listener, port) = listen().await;
    let server = task::spawn(serve(
        listener,
        vec![
            ("X0001 LOGIN joe blogs\r\n", ""),
            ("X0002 SELECT INBOX\r\n", ""),
            (
                "X0003 SEARCH UNSEEN\r\n",
                "X0001 OK logged in\r\n* 3 EXISTS\r\nX0002 OK selected\r\n\
                 * SEARCH 1 3\r\nX0003 OK searched\r\n",
            ),
        ],
    ));

    let tcp = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let config = Config {
        tag_prefix: "X".into(),
        ..Config::default()
    };
    let (client, stream) = Client::with_config(tcp, config);
    let session = async {
        let login = client.login("joe", "blogs")?;
        let select = client.select("INBOX")?;
        let search = client.search("UNSEEN")?;
        let (login, select, search) = futures::join!(login, select, search);
        login?;
        select?;
        let found = search?;
        client.stop();
        client.connection().close();
        Ok::<_, async_imap_engine::error::Error>(found)
    };
    let (driven, found) = futures::join!(stream.run(), session);

    driven.unwrap();
    assert_eq!(found.unwrap(), vec![1, 3]);
    assert_eq!(server.await.len(), 3);
}
