use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! text_enum {
	($name:ident { $($variant:ident => $text:literal,)+ }) => {
		#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
		#[serde(rename_all = "snake_case")]
		pub enum $name {
			$($variant,)+
		}
		impl $name {
			pub fn as_str(&self) -> &'static str {
				match self {
					$(Self::$variant => $text,)+
				}
			}
		}
		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(self.as_str())
			}
		}
		impl FromStr for $name {
			type Err = UnknownVariant;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s {
					$($text => Ok(Self::$variant),)+
					_ => Err(UnknownVariant { kind: stringify!($name), value: s.to_string() }),
				}
			}
		}
	};
}

#[derive(Debug)]
pub struct UnknownVariant {
	pub kind: &'static str,
	pub value: String,
}
impl fmt::Display for UnknownVariant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Unknown {} value: {:?}.", self.kind, self.value)
	}
}
impl std::error::Error for UnknownVariant {}

text_enum!(Direction {
	Inbound => "inbound",
	Outbound => "outbound",
});

text_enum!(OccurrenceState {
	Discovered => "discovered",
	Fetched => "fetched",
	Parsed => "parsed",
	Stitched => "stitched",
	Routed => "routed",
	Failed => "failed",
});

text_enum!(TicketStatus {
	New => "new",
	Open => "open",
	Pending => "pending",
	Resolved => "resolved",
	Closed => "closed",
	Spam => "spam",
});

text_enum!(JobStatus {
	Queued => "queued",
	Running => "running",
	Failed => "failed",
	Dead => "dead",
	Done => "done",
});

text_enum!(JobType {
	MailboxBackfill => "mailbox_backfill",
	MailboxHistorySync => "mailbox_history_sync",
	OccurrenceFetchRaw => "occurrence_fetch_raw",
	OccurrenceParse => "occurrence_parse",
	OccurrenceStitch => "occurrence_stitch",
	TicketApplyRouting => "ticket_apply_routing",
});

text_enum!(RecipientSource {
	WorkspaceHeader => "workspace_header",
	DeliveredTo => "delivered_to",
	XOriginalTo => "x_original_to",
	ToCcScan => "to_cc_scan",
	Unknown => "unknown",
});

text_enum!(Confidence {
	High => "high",
	Medium => "medium",
	Low => "low",
});

text_enum!(StitchReason {
	NewTicket => "new_ticket",
	XOssMarker => "x_oss_marker",
	ReplyToToken => "reply_to_token",
	ReferencesGraph => "references_graph",
	SubjectMatch => "subject_match",
});
