/// Lua script for atomic check-and-set (set-if-not-exists).
///
/// KEYS\[1\] = the data key
/// ARGV\[1\] = value to set
/// ARGV\[2\] = TTL in milliseconds (0 means no expiry)
///
/// Returns 1 if the key was newly set, 0 if it already existed.
pub const CHECK_AND_SET: &str = r"
local ttl = tonumber(ARGV[2])
local ok
if ttl > 0 then
    ok = redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ttl)
else
    ok = redis.call('SET', KEYS[1], ARGV[1], 'NX')
end
if ok then
    return 1
end
return 0
";

/// Lua script for fenced delete.
///
/// KEYS\[1\] = the data key
/// ARGV\[1\] = expected value
///
/// Returns 1 if the key held the expected value and was deleted, 0 otherwise.
pub const DELETE_IF_VALUE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Lua script for a fenced TTL refresh.
///
/// KEYS\[1\] = the data key
/// ARGV\[1\] = expected value (owner token)
/// ARGV\[2\] = TTL in milliseconds
///
/// Returns 1 if the key held the expected value and its TTL was reset, 2 if
/// the key was absent and has been written again, 0 if it holds another
/// value.
pub const REFRESH_IF_VALUE: &str = r"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
if not current then
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
    return 2
end
return 0
";

/// Lua script for a windowed counter.
///
/// KEYS\[1\] = the counter key
/// ARGV\[1\] = window in milliseconds
///
/// Returns the post-increment value. The expiry is only set when the counter
/// is created, so the window is anchored at the first increment.
pub const INCR_WITH_EXPIRY: &str = r"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return n
";

/// Lua script that applies an expiry to a key that has none.
///
/// KEYS\[1\] = the key
/// ARGV\[1\] = TTL in milliseconds
///
/// Returns 1 if an expiry was applied, 0 if the key is missing or already
/// expires.
pub const EXPIRE_IF_UNSET: &str = r"
if redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    return 1
end
return 0
";

/// Lua script for bounded set admission.
///
/// KEYS\[1\] = the active-member set
/// KEYS\[2\] = the member's heartbeat key
/// ARGV\[1\] = member
/// ARGV\[2\] = maximum set size
/// ARGV\[3\] = heartbeat TTL in milliseconds
///
/// Returns 2 if the member is already active, 0 if the set is full, 1 if the
/// member was added and its heartbeat written.
pub const SEMAPHORE_ACQUIRE: &str = r"
if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 1 then
    return 2
end
if redis.call('SCARD', KEYS[1]) >= tonumber(ARGV[2]) then
    return 0
end
redis.call('SET', KEYS[2], '1', 'PX', ARGV[3])
redis.call('SADD', KEYS[1], ARGV[1])
return 1
";

/// Lua script that renews a heartbeat only for a current set member.
///
/// KEYS\[1\] = the active-member set
/// KEYS\[2\] = the member's heartbeat key
/// ARGV\[1\] = member
/// ARGV\[2\] = heartbeat TTL in milliseconds
///
/// Returns 1 if the heartbeat was written, 0 if the member is not in the set.
pub const SEMAPHORE_KEEP_ALIVE: &str = r"
if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 1 then
    redis.call('SET', KEYS[2], '1', 'PX', ARGV[2])
    return 1
end
return 0
";

/// Lua script that drops a set member whose heartbeat has expired.
///
/// KEYS\[1\] = the active-member set
/// KEYS\[2\] = the member's heartbeat key
/// ARGV\[1\] = member
///
/// Returns 1 if the member was removed, 0 if its heartbeat is live or it was
/// not a member.
pub const SEMAPHORE_REMOVE_STALE: &str = r"
if redis.call('EXISTS', KEYS[2]) == 1 then
    return 0
end
return redis.call('SREM', KEYS[1], ARGV[1])
";

/// Lua script for a bounded hash counter.
///
/// KEYS\[1\] = the counter hash
/// ARGV\[1\] = field
/// ARGV\[2\] = limit
///
/// Returns 1 if the field was below the limit and was incremented, 0 if the
/// hash was left untouched.
pub const HASH_CHECK_AND_INCREMENT: &str = r"
local current = tonumber(redis.call('HGET', KEYS[1], ARGV[1]) or '0')
if current < tonumber(ARGV[2]) then
    redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
    return 1
end
return 0
";
