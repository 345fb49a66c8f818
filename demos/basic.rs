use async_imap_engine::error::{Error, Result};
use async_imap_engine::imap_proto::{AttributeValue, Response};
use async_std::task;
use std::env;

fn main() -> Result<()> {
    task::block_on(async {
        let args: Vec<String> = env::args().collect();
        if args.len() != 4 {
            eprintln!("need three arguments: imap-server login password");
            Err(Error::Bad("need three arguments".into()))
        } else {
            if let Some(body) = fetch_inbox_top(&args[1], &args[2], &args[3]).await? {
                println!("{}", body);
            }
            Ok(())
        }
    })
}

async fn fetch_inbox_top(imap_server: &str, login: &str, password: &str) -> Result<Option<String>> {
    let (client, stream) = async_imap_engine::connect(imap_server, 993, true).await?;
    println!("** connected to {}:{}", imap_server, 993);

    let session = async {
        client.greeting().await?;

        // commands are pipelined: none of these waits for the one before
        let login = client.login(login, password)?;
        let select = client.select("INBOX")?;
        let messages = client.fetch("1", "RFC822")?;

        login.await?;
        select.await?;
        let messages = messages.await?;

        // be nice to the server and log out
        client.logout()?.await?;
        Ok::<_, Error>(messages)
    };

    // the stream has to be driven alongside the session
    let (driven, messages) = futures::join!(stream.run(), session);
    driven?;

    let body = messages?.first().and_then(|reply| match reply.parsed() {
        Response::Fetch(_, attributes) => attributes.iter().find_map(|attr| match attr {
            AttributeValue::Rfc822(Some(body)) => Some(String::from_utf8_lossy(body).into_owned()),
            _ => None,
        }),
        _ => None,
    });
    Ok(body)
}
