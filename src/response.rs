//! IRC numeric response codes the client engine acts on.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

use std::str::FromStr;

use crate::message::Message;

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    // === Connection Registration (001-099) ===
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 005 - Server supported features (ISUPPORT)
    RPL_ISUPPORT = 5,

    // === Command Responses (200-399) ===
    /// 263 - Server dropped the command, try again later
    RPL_TRYAGAIN = 263,
    /// 276 - WHOIS certificate fingerprint
    RPL_WHOISCERTFP = 276,
    /// 301 - Away message
    RPL_AWAY = 301,
    /// 311 - WHOIS user info
    RPL_WHOISUSER = 311,
    /// 312 - WHOIS server info
    RPL_WHOISSERVER = 312,
    /// 313 - WHOIS operator status
    RPL_WHOISOPERATOR = 313,
    /// 315 - End of WHO list
    RPL_ENDOFWHO = 315,
    /// 317 - WHOIS idle time
    RPL_WHOISIDLE = 317,
    /// 318 - End of WHOIS
    RPL_ENDOFWHOIS = 318,
    /// 319 - WHOIS channels
    RPL_WHOISCHANNELS = 319,
    /// 330 - WHOIS account name
    RPL_WHOISACCOUNT = 330,
    /// 335 - WHOIS bot flag
    RPL_WHOISBOT = 335,
    /// 352 - WHO reply
    RPL_WHOREPLY = 352,
    /// 353 - NAMES reply
    RPL_NAMREPLY = 353,
    /// 354 - WHOX reply
    RPL_WHOSPCRPL = 354,
    /// 366 - End of NAMES
    RPL_ENDOFNAMES = 366,
    /// 376 - End of MOTD
    RPL_ENDOFMOTD = 376,

    // === Error Replies (400-599) ===
    /// 400 - Unknown error
    ERR_UNKNOWNERROR = 400,
    /// 401 - No such nick/channel
    ERR_NOSUCHNICK = 401,
    /// 403 - No such channel
    ERR_NOSUCHCHANNEL = 403,
    /// 405 - Too many channels
    ERR_TOOMANYCHANNELS = 405,
    /// 421 - Unknown command
    ERR_UNKNOWNCOMMAND = 421,
    /// 422 - MOTD file missing
    ERR_NOMOTD = 422,
    /// 432 - Erroneous nickname
    ERR_ERRONEOUSNICKNAME = 432,
    /// 433 - Nickname in use
    ERR_NICKNAMEINUSE = 433,
    /// 436 - Nickname collision
    ERR_NICKCOLLISION = 436,
    /// 437 - Resource unavailable
    ERR_UNAVAILRESOURCE = 437,
    /// 461 - Not enough parameters
    ERR_NEEDMOREPARAMS = 461,
    /// 463 - No permission for host
    ERR_NOPERMFORHOST = 463,
    /// 464 - Password incorrect
    ERR_PASSWDMISMATCH = 464,
    /// 465 - You are banned
    ERR_YOUREBANNEDCREEP = 465,
    /// 471 - Channel is full
    ERR_CHANNELISFULL = 471,
    /// 473 - Invite only channel
    ERR_INVITEONLYCHAN = 473,
    /// 474 - Banned from channel
    ERR_BANNEDFROMCHAN = 474,
    /// 475 - Bad channel key
    ERR_BADCHANNELKEY = 475,
    /// 476 - Bad channel mask
    ERR_BADCHANMASK = 476,
    /// 477 - Need registered nick
    ERR_NEEDREGGEDNICK = 477,

    // === Extended Replies (600-999) ===
    /// 671 - WHOIS secure connection
    RPL_WHOISSECURE = 671,
    /// 730 - Monitored nick(s) online
    RPL_MONONLINE = 730,
    /// 731 - Monitored nick(s) offline
    RPL_MONOFFLINE = 731,
    /// 732 - MONITOR list entry
    RPL_MONLIST = 732,
    /// 733 - End of MONITOR list
    RPL_ENDOFMONLIST = 733,
    /// 734 - MONITOR list is full
    ERR_MONLISTFULL = 734,
    /// 900 - Logged in
    RPL_LOGGEDIN = 900,
    /// 901 - Logged out
    RPL_LOGGEDOUT = 901,
    /// 902 - Nick locked
    ERR_NICKLOCKED = 902,
    /// 903 - SASL success
    RPL_SASLSUCCESS = 903,
    /// 904 - SASL failed
    ERR_SASLFAIL = 904,
    /// 905 - SASL message too long
    ERR_SASLTOOLONG = 905,
    /// 906 - SASL aborted
    ERR_SASLABORT = 906,
    /// 907 - Already authenticated
    ERR_SASLALREADY = 907,
    /// 908 - Available SASL mechanisms
    RPL_SASLMECHS = 908,
}

impl Response {
    /// Returns the numeric code as u16
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Creates a Response from a numeric code
    pub fn from_code(code: u16) -> Option<Response> {
        Some(match code {
            1 => Response::RPL_WELCOME,
            5 => Response::RPL_ISUPPORT,
            263 => Response::RPL_TRYAGAIN,
            276 => Response::RPL_WHOISCERTFP,
            301 => Response::RPL_AWAY,
            311 => Response::RPL_WHOISUSER,
            312 => Response::RPL_WHOISSERVER,
            313 => Response::RPL_WHOISOPERATOR,
            315 => Response::RPL_ENDOFWHO,
            317 => Response::RPL_WHOISIDLE,
            318 => Response::RPL_ENDOFWHOIS,
            319 => Response::RPL_WHOISCHANNELS,
            330 => Response::RPL_WHOISACCOUNT,
            335 => Response::RPL_WHOISBOT,
            352 => Response::RPL_WHOREPLY,
            353 => Response::RPL_NAMREPLY,
            354 => Response::RPL_WHOSPCRPL,
            366 => Response::RPL_ENDOFNAMES,
            376 => Response::RPL_ENDOFMOTD,
            400 => Response::ERR_UNKNOWNERROR,
            401 => Response::ERR_NOSUCHNICK,
            403 => Response::ERR_NOSUCHCHANNEL,
            405 => Response::ERR_TOOMANYCHANNELS,
            421 => Response::ERR_UNKNOWNCOMMAND,
            422 => Response::ERR_NOMOTD,
            432 => Response::ERR_ERRONEOUSNICKNAME,
            433 => Response::ERR_NICKNAMEINUSE,
            436 => Response::ERR_NICKCOLLISION,
            437 => Response::ERR_UNAVAILRESOURCE,
            461 => Response::ERR_NEEDMOREPARAMS,
            463 => Response::ERR_NOPERMFORHOST,
            464 => Response::ERR_PASSWDMISMATCH,
            465 => Response::ERR_YOUREBANNEDCREEP,
            471 => Response::ERR_CHANNELISFULL,
            473 => Response::ERR_INVITEONLYCHAN,
            474 => Response::ERR_BANNEDFROMCHAN,
            475 => Response::ERR_BADCHANNELKEY,
            476 => Response::ERR_BADCHANMASK,
            477 => Response::ERR_NEEDREGGEDNICK,
            671 => Response::RPL_WHOISSECURE,
            730 => Response::RPL_MONONLINE,
            731 => Response::RPL_MONOFFLINE,
            732 => Response::RPL_MONLIST,
            733 => Response::RPL_ENDOFMONLIST,
            734 => Response::ERR_MONLISTFULL,
            900 => Response::RPL_LOGGEDIN,
            901 => Response::RPL_LOGGEDOUT,
            902 => Response::ERR_NICKLOCKED,
            903 => Response::RPL_SASLSUCCESS,
            904 => Response::ERR_SASLFAIL,
            905 => Response::ERR_SASLTOOLONG,
            906 => Response::ERR_SASLABORT,
            907 => Response::ERR_SASLALREADY,
            908 => Response::RPL_SASLMECHS,
            _ => return None,
        })
    }

    /// Check if this is an error response (4xx, 5xx, or specific error codes)
    #[inline]
    pub fn is_error(&self) -> bool {
        let code = self.code();
        (400..600).contains(&code) || code == 734 || (902..=907).contains(&code)
    }

    /// Check if this is a SASL-related response (900-908)
    #[inline]
    pub fn is_sasl(&self) -> bool {
        (900..=908).contains(&self.code())
    }

    /// Errors that end registration: there is no point in waiting for
    /// `RPL_WELCOME` after these.
    #[inline]
    pub fn is_registration_fatal(&self) -> bool {
        matches!(
            self,
            Response::ERR_PASSWDMISMATCH
                | Response::ERR_ERRONEOUSNICKNAME
                | Response::ERR_NICKNAMEINUSE
                | Response::ERR_NICKCOLLISION
                | Response::ERR_UNAVAILRESOURCE
                | Response::ERR_NOPERMFORHOST
                | Response::ERR_YOUREBANNEDCREEP
        )
    }

    /// SASL failure numerics.
    #[inline]
    pub fn is_sasl_failure(&self) -> bool {
        matches!(
            self,
            Response::ERR_NICKLOCKED
                | Response::ERR_SASLFAIL
                | Response::ERR_SASLTOOLONG
                | Response::ERR_SASLABORT
                | Response::ERR_SASLALREADY
        )
    }

    /// Generic errors whose second parameter names the failed command.
    #[inline]
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            Response::ERR_UNKNOWNCOMMAND
                | Response::ERR_UNKNOWNERROR
                | Response::ERR_NEEDMOREPARAMS
                | Response::RPL_TRYAGAIN
        )
    }

    /// Errors a JOIN can fail with; the second parameter is the channel.
    #[inline]
    pub fn is_join_error(&self) -> bool {
        matches!(
            self,
            Response::ERR_NOSUCHCHANNEL
                | Response::ERR_TOOMANYCHANNELS
                | Response::ERR_BANNEDFROMCHAN
                | Response::ERR_INVITEONLYCHAN
                | Response::ERR_BADCHANNELKEY
                | Response::ERR_CHANNELISFULL
                | Response::ERR_NEEDREGGEDNICK
                | Response::ERR_BADCHANMASK
        )
    }

    /// Check if this is a WHOIS-related response
    #[inline]
    pub fn is_whois_related(&self) -> bool {
        matches!(
            self,
            Response::RPL_AWAY
                | Response::RPL_WHOISUSER
                | Response::RPL_WHOISSERVER
                | Response::RPL_WHOISOPERATOR
                | Response::RPL_WHOISIDLE
                | Response::RPL_WHOISCHANNELS
                | Response::RPL_WHOISACCOUNT
                | Response::RPL_WHOISBOT
                | Response::RPL_WHOISCERTFP
                | Response::RPL_WHOISSECURE
        )
    }
}

impl FromStr for Response {
    type Err = ParseResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: u16 = s.parse().map_err(|_| ParseResponseError::InvalidFormat)?;
        Response::from_code(code).ok_or(ParseResponseError::UnknownCode(code))
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

/// Error when parsing a response code
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseResponseError {
    /// The string was not a valid number
    InvalidFormat,
    /// The numeric code is not a known response
    UnknownCode(u16),
}

impl std::fmt::Display for ParseResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "invalid response code format"),
            Self::UnknownCode(code) => write!(f, "unknown response code: {}", code),
        }
    }
}

impl std::error::Error for ParseResponseError {}

impl Message {
    /// The known numeric of this message, if it is one.
    pub fn response(&self) -> Option<Response> {
        if !self.is_numeric() {
            return None;
        }
        self.command.parse().ok()
    }
}
