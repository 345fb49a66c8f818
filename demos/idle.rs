use std::env;
use std::time::Duration;

use async_imap_engine::error::{Error, Result};
use async_imap_engine::extensions::idle::IdleResponse;
use async_std::task;

fn main() -> Result<()> {
    task::block_on(async {
        let args: Vec<String> = env::args().collect();
        if args.len() != 4 {
            eprintln!("need three arguments: imap-server login password");
            Err(Error::Bad("need three arguments".into()))
        } else {
            perform_idle(&args[1], &args[2], &args[3]).await
        }
    })
}

async fn perform_idle(imap_server: &str, login: &str, password: &str) -> Result<()> {
    let (client, stream) = async_imap_engine::connect(imap_server, 993, true).await?;
    println!("** connected to {}:{}", imap_server, 993);

    let session = async {
        client.greeting().await?;
        client.login(login, password)?.await?;
        println!("** logged in as {}", login);

        client.select("INBOX")?.await?;
        println!("** INBOX selected");

        let idle = client.idle()?;
        println!("** idling for up to a minute");
        loop {
            match idle.wait_with_timeout(Duration::from_secs(60)).await? {
                IdleResponse::NewData(reply) => println!("** new data: {:?}", reply.parsed()),
                IdleResponse::Timeout => {
                    println!("** timed out");
                    break;
                }
                IdleResponse::ManualInterrupt => break,
            }
        }
        idle.done().await?;

        // be nice to the server and log out
        println!("** Logging out");
        client.logout()?.await?;
        Ok::<_, Error>(())
    };

    let (driven, res) = futures::join!(stream.run(), session);
    driven?;
    res
}
