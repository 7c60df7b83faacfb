//! treasury contract bindings

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IOtsTreasury {
        /// id the next published batch will receive
        function nextRootId() external view returns (uint256 next);

        /// batch properties; zeroed struct for an unknown id
        function merkleRoots(uint256 id) external view returns (
            bytes32 rootHash,
            address token,
            uint256 denomination,
            bool active,
            uint256 totalKeys,
            uint256 usedKeys
        );

        /// redeem one leaf; reverts with "key already used",
        /// "root inactive", "insufficient treasury balance" or
        /// "invalid signature"
        function withdraw(
            address token,
            address recipient,
            uint256 amount,
            uint256 rootId,
            bytes calldata signature,
            bytes32[] calldata proof,
            uint256 treeIndex
        ) external;

        event Withdrawn(
            uint256 indexed rootId,
            uint256 indexed treeIndex,
            address recipient,
            address token,
            uint256 amount
        );
    }
}
