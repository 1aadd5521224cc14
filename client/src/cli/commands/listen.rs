use tokio::sync::broadcast::error::RecvError;
use windcalm_client::WindcalmClientError;

use crate::{Params, utils::create_transport};

pub async fn listen(params: Params) -> Result<(), WindcalmClientError> {
    let transport = create_transport(&params)?;
    let mut status = transport.status();
    let mut reports = transport.subscribe_reports();
    println!("Connection: {}", status.state());

    loop {
        tokio::select! {
            state = status.changed() => match state {
                Some(state) => println!("Connection: {state}"),
                None => break,
            },
            report = reports.recv() => match report {
                Ok(report) => {
                    for (dp, value) in report.dps {
                        println!("{dp}: {value}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => println!("Skipped {skipped} reports"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    transport.stop().await;
    Ok(())
}
